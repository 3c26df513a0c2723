//! Student self-registration.

use super::{db_err, redirect};
use crate::accounts::{self, NewUser};
use crate::catalog;
use crate::constants::MIN_PASSWORD_LENGTH;
use crate::flash;
use crate::forms::{
    id_options, level_options, non_empty, parse_id, FormErrors, SelectOption, ACADEMIC_ID_RE,
    PHONE_RE, USERNAME_RE,
};
use crate::middleware::csrf::validate_csrf_token;
use crate::middleware::ClientCtx;
use crate::orm::users::Role;
use crate::session;
use actix_web::{get, post, web, Error, HttpResponse};
use askama_actix::{Template, TemplateToResponse};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use validator::Validate;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_register).service(post_register);
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub client: ClientCtx,
    pub form: RegisterForm,
    pub departments: Vec<SelectOption>,
    pub specializations: Vec<SelectOption>,
    pub levels: Vec<SelectOption>,
    pub errors: FormErrors,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RegisterForm {
    #[validate(regex(
        path = "USERNAME_RE",
        message = "Letters, digits and @/./+/-/_ only."
    ))]
    pub username: String,
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(min = 1, max = 150, message = "This field is required."))]
    pub first_name: String,
    #[validate(length(min = 1, max = 150, message = "This field is required."))]
    pub last_name: String,
    #[validate(regex(
        path = "ACADEMIC_ID_RE",
        message = "Enter a valid academic ID (3-20 letters, digits or dashes)."
    ))]
    pub academic_id: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
    #[serde(default)]
    pub csrf_token: String,
}

impl RegisterForm {
    fn check(&self) -> FormErrors {
        let mut errors = match self.validate() {
            Ok(()) => FormErrors::new(),
            Err(e) => FormErrors::from_validation(&e),
        };
        if let Some(phone) = non_empty(&self.phone) {
            if !PHONE_RE.is_match(&phone) {
                errors.add("phone", "Enter a valid phone number.");
            }
        }
        if parse_id(self.level.as_deref()).is_none() {
            errors.add("level", "This field is required.");
        }
        if self.password1.chars().count() < MIN_PASSWORD_LENGTH {
            errors.add(
                "password1",
                format!("Password must be at least {} characters.", MIN_PASSWORD_LENGTH),
            );
        }
        if self.password1 != self.password2 {
            errors.add("password2", "The two password fields didn't match.");
        }
        errors
    }

    fn to_new_user(&self) -> NewUser {
        NewUser {
            username: self.username.trim().to_owned(),
            email: self.email.trim().to_owned(),
            first_name: self.first_name.trim().to_owned(),
            last_name: self.last_name.trim().to_owned(),
            password: self.password1.clone(),
            role: Role::Student,
            academic_id: Some(self.academic_id.trim().to_owned()),
            phone: non_empty(&self.phone),
            department_id: parse_id(self.department.as_deref()),
            specialization_id: parse_id(self.specialization.as_deref()),
            level: parse_id(self.level.as_deref()),
        }
    }
}

async fn render(
    client: ClientCtx,
    db: &DatabaseConnection,
    mut form: RegisterForm,
    errors: FormErrors,
) -> Result<HttpResponse, Error> {
    let department_id = parse_id(form.department.as_deref());
    let departments = catalog::all_departments(db).await.map_err(db_err)?;
    let specializations = match department_id {
        Some(dep) => catalog::specializations_for_department(db, dep)
            .await
            .map_err(db_err)?,
        None => Vec::new(),
    };

    form.password1.clear();
    form.password2.clear();
    let level = parse_id(form.level.as_deref());
    let specialization = parse_id(form.specialization.as_deref());

    Ok(RegisterTemplate {
        client,
        form,
        departments: id_options(departments.into_iter().map(|d| (d.id, d.name)), department_id),
        specializations: id_options(
            specializations.into_iter().map(|s| (s.id, s.name)),
            specialization,
        ),
        levels: level_options(level),
        errors,
    }
    .to_response())
}

#[get("/register/")]
pub async fn view_register(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, Error> {
    if client.is_user() {
        return Ok(redirect("/dashboard/"));
    }
    render(client, &db, RegisterForm::default(), FormErrors::new()).await
}

#[post("/register/")]
pub async fn post_register(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    form: web::Form<RegisterForm>,
) -> Result<HttpResponse, Error> {
    validate_csrf_token(&cookies, &form.csrf_token)?;
    let form = form.into_inner();

    let mut errors = form.check();
    if errors.is_empty() {
        match accounts::register_student(&db, form.to_new_user()).await {
            Ok(user) => {
                session::start_session(&cookies, &user, false)?;
                flash::success(&cookies, "Your account has been created. Welcome!");
                log::info!("Student {} registered as '{}'", user.id, user.username);
                return Ok(redirect("/dashboard/"));
            }
            Err(e) => errors.absorb(e)?,
        }
    }

    render(client, &db, form, errors).await
}
