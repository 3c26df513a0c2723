use super::{db_err, redirect};
use crate::accounts::{self, LoginOutcome};
use crate::flash;
use crate::forms::FormErrors;
use crate::middleware::csrf::validate_csrf_token;
use crate::middleware::ClientCtx;
use crate::session;
use actix_web::{get, post, web, Error, HttpResponse};
use askama_actix::{Template, TemplateToResponse};
use sea_orm::DatabaseConnection;
use serde::Deserialize;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(post_login).service(view_login);
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub client: ClientCtx,
    pub username: String,
    pub next: String,
    pub errors: FormErrors,
}

#[derive(Deserialize)]
pub struct LoginQuery {
    next: Option<String>,
}

#[derive(Deserialize)]
pub struct FormData {
    username: String,
    password: String,
    remember_me: Option<String>,
    next: Option<String>,
    csrf_token: String,
}

/// Where to go after login. Only local absolute paths are followed.
pub fn safe_next(next: Option<&str>) -> String {
    match next.map(str::trim) {
        Some(n) if n.starts_with('/') && !n.starts_with("//") && !n.contains('\\') => n.to_owned(),
        _ => "/dashboard/".to_owned(),
    }
}

#[post("/login/")]
pub async fn post_login(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    form: web::Form<FormData>,
) -> Result<HttpResponse, Error> {
    validate_csrf_token(&cookies, &form.csrf_token)?;
    let form = form.into_inner();
    let mut errors = FormErrors::new();

    if form.username.trim().is_empty() || form.password.is_empty() {
        errors.add_non_field("Please enter your username and password.");
    } else {
        match accounts::authenticate(&db, form.username.trim(), &form.password)
            .await
            .map_err(db_err)?
        {
            LoginOutcome::Success(user) => {
                let user = accounts::record_login(&db, user).await.map_err(db_err)?;
                session::start_session(&cookies, &user, form.remember_me.is_some())?;
                flash::success(&cookies, format!("Welcome, {}!", user.full_name()));
                log::info!("User {} logged in", user.id);
                return Ok(redirect(&safe_next(form.next.as_deref())));
            }
            LoginOutcome::Inactive => {
                log::debug!("login failure: inactive account {}", form.username);
                errors.add_non_field("This account has been deactivated.");
            }
            LoginOutcome::BadCredentials => {
                log::debug!("login failure: bad credentials for {}", form.username);
                // Use generic message to avoid username enumeration
                errors.add_non_field("Invalid username or password.");
            }
        }
    }

    Ok(LoginTemplate {
        client,
        username: form.username,
        next: form.next.unwrap_or_default(),
        errors,
    }
    .to_response())
}

#[get("/login/")]
pub async fn view_login(client: ClientCtx, query: web::Query<LoginQuery>) -> HttpResponse {
    if client.is_user() {
        return redirect("/dashboard/");
    }
    LoginTemplate {
        client,
        username: String::new(),
        next: query.into_inner().next.unwrap_or_default(),
        errors: FormErrors::new(),
    }
    .to_response()
}
