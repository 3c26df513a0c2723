use crate::accounts::{self, NewUser, UserFilter};
use crate::catalog;
use crate::constants::MIN_PASSWORD_LENGTH;
use crate::flash;
use crate::forms::{
    id_options, level_options, non_empty, parse_id, str_options, FormErrors, SelectOption,
    PHONE_RE, USERNAME_RE,
};
use crate::middleware::csrf::{validate_csrf_token, validate_form_token};
use crate::middleware::ClientCtx;
use crate::orm::users::{self, Role};
use crate::permission::Capabilities;
use crate::template::{page_param, Paginator};
use crate::web::{db_err, redirect};
use actix_web::{error, get, post, web, Error, HttpResponse};
use askama_actix::{Template, TemplateToResponse};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;

pub(super) fn configure(conf: &mut web::ServiceConfig) {
    conf.service(view_users)
        .service(view_new_user)
        .service(post_new_user)
        .service(post_toggle_user)
        .service(post_delete_user);
}

#[derive(Default, Deserialize)]
pub struct UserQuery {
    pub role: Option<String>,
    pub q: Option<String>,
    pub page: Option<u64>,
}

#[derive(Template)]
#[template(path = "admin/users.html")]
pub struct UsersTemplate {
    pub client: ClientCtx,
    pub users: Vec<users::Model>,
    /// The viewing admin; their own row has no actions.
    pub self_id: i32,
    pub q: String,
    pub roles: Vec<SelectOption>,
    pub paginator: Paginator,
}

#[derive(Template)]
#[template(path = "admin/user_form.html")]
pub struct UserFormTemplate {
    pub client: ClientCtx,
    pub form: UserForm,
    pub roles: Vec<SelectOption>,
    pub departments: Vec<SelectOption>,
    pub specializations: Vec<SelectOption>,
    pub levels: Vec<SelectOption>,
    pub errors: FormErrors,
}

#[derive(Default, Deserialize)]
pub struct UserForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub academic_id: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub csrf_token: String,
}

impl UserForm {
    fn to_new_user(&self, errors: &mut FormErrors) -> Option<NewUser> {
        if !USERNAME_RE.is_match(self.username.trim()) {
            errors.add("username", "Letters, digits and @/./+/-/_ only.");
        }
        if !validator::validate_email(self.email.trim()) {
            errors.add("email", "Enter a valid email address.");
        }
        for (field, value) in [("first_name", &self.first_name), ("last_name", &self.last_name)] {
            if value.trim().is_empty() {
                errors.add(field, "This field is required.");
            }
        }
        if let Some(phone) = non_empty(&self.phone) {
            if !PHONE_RE.is_match(&phone) {
                errors.add("phone", "Enter a valid phone number.");
            }
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            errors.add(
                "password",
                format!("Password must be at least {} characters.", MIN_PASSWORD_LENGTH),
            );
        }
        let role = Role::from_str(&self.role).ok();
        if role.is_none() {
            errors.add("role", "Choose a role.");
        }
        let level = parse_id(self.level.as_deref());
        if role == Some(Role::Student) && level.is_none() {
            errors.add("level", "Students need a level.");
        }

        Some(NewUser {
            username: self.username.trim().to_owned(),
            email: self.email.trim().to_owned(),
            first_name: self.first_name.trim().to_owned(),
            last_name: self.last_name.trim().to_owned(),
            password: self.password.clone(),
            role: role?,
            academic_id: non_empty(&self.academic_id),
            phone: non_empty(&self.phone),
            department_id: parse_id(self.department.as_deref()),
            specialization_id: parse_id(self.specialization.as_deref()),
            level,
        })
    }
}

fn role_options(selected: &str) -> Vec<SelectOption> {
    str_options(Role::ALL.iter().map(|r| (r.as_str(), r.label())), selected)
}

fn blank(label: &str, selected: bool) -> SelectOption {
    SelectOption {
        value: String::new(),
        label: label.to_owned(),
        selected,
    }
}

/// Listing URL with the current filters, ready for `page=N`.
fn listing_base_url(role: Option<Role>, q: &Option<String>) -> String {
    let mut ser = url::form_urlencoded::Serializer::new(String::new());
    if let Some(role) = role {
        ser.append_pair("role", role.as_str());
    }
    if let Some(q) = q {
        ser.append_pair("q", q);
    }
    let query = ser.finish();
    if query.is_empty() {
        "/admin/users/?".to_owned()
    } else {
        format!("/admin/users/?{}&", query)
    }
}

async fn render_form(
    client: ClientCtx,
    db: &DatabaseConnection,
    mut form: UserForm,
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

    let mut department_opts = vec![blank("None", department_id.is_none())];
    department_opts.extend(id_options(
        departments.into_iter().map(|d| (d.id, d.name)),
        department_id,
    ));
    let specialization_id = parse_id(form.specialization.as_deref());
    let mut specialization_opts = vec![blank("None", specialization_id.is_none())];
    specialization_opts.extend(id_options(
        specializations.into_iter().map(|s| (s.id, s.name)),
        specialization_id,
    ));
    let level = parse_id(form.level.as_deref());
    let mut levels = vec![blank("None", level.is_none())];
    levels.extend(level_options(level));

    form.password.clear();
    Ok(UserFormTemplate {
        client,
        roles: role_options(&form.role),
        form,
        departments: department_opts,
        specializations: specialization_opts,
        levels,
        errors,
    }
    .to_response())
}

#[get("/users/")]
pub async fn view_users(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    query: web::Query<UserQuery>,
) -> Result<HttpResponse, Error> {
    client.require_capability(Capabilities::MANAGE_USERS)?;
    let filter = UserFilter {
        role: query.role.as_deref().and_then(|r| Role::from_str(r).ok()),
        q: non_empty(&query.q),
    };
    let page = page_param(query.page);
    let per_page = crate::app_config::limits().admin_page_size;
    let (users, page_count) = accounts::list_users(&db, &filter, page, per_page)
        .await
        .map_err(db_err)?;

    let mut roles = vec![blank("All roles", filter.role.is_none())];
    roles.extend(role_options(
        filter.role.map(|r| r.as_str()).unwrap_or_default(),
    ));

    Ok(UsersTemplate {
        self_id: client.get_id().unwrap_or_default(),
        client,
        users,
        paginator: Paginator::new(listing_base_url(filter.role, &filter.q), page, page_count),
        q: filter.q.unwrap_or_default(),
        roles,
    }
    .to_response())
}

#[get("/users/new/")]
pub async fn view_new_user(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, Error> {
    client.require_capability(Capabilities::MANAGE_USERS)?;
    let form = UserForm {
        role: Role::Student.as_str().to_owned(),
        ..Default::default()
    };
    render_form(client, &db, form, FormErrors::new()).await
}

#[post("/users/new/")]
pub async fn post_new_user(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    form: web::Form<UserForm>,
) -> Result<HttpResponse, Error> {
    validate_csrf_token(&cookies, &form.csrf_token)?;
    client.require_capability(Capabilities::MANAGE_USERS)?;
    let form = form.into_inner();

    let mut errors = FormErrors::new();
    let new = form.to_new_user(&mut errors);
    if let (true, Some(new)) = (errors.is_empty(), new) {
        match accounts::create_user(db.get_ref(), new).await {
            Ok(user) => {
                log::info!(
                    "User {} created account {} ({})",
                    client.get_id().unwrap_or_default(),
                    user.id,
                    user.role.as_str()
                );
                flash::success(&cookies, format!("User {} created.", user.username));
                return Ok(redirect("/admin/users/"));
            }
            Err(e) => errors.absorb(e)?,
        }
    }
    render_form(client, &db, form, errors).await
}

/// Rejects actions an admin may not take on their own account.
fn not_self(client: &ClientCtx, user_id: i32, what: &str) -> Result<(), Error> {
    if client.get_id() == Some(user_id) {
        return Err(error::ErrorBadRequest(format!(
            "You cannot {} your own account.",
            what
        )));
    }
    Ok(())
}

#[post("/users/{id}/toggle/")]
pub async fn post_toggle_user(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    form: web::Form<HashMap<String, String>>,
) -> Result<HttpResponse, Error> {
    validate_form_token(&cookies, &form)?;
    client.require_capability(Capabilities::MANAGE_USERS)?;
    let id = path.into_inner();
    not_self(&client, id, "deactivate")?;

    let user = accounts::find_user(db.get_ref(), id).await?;
    let user = accounts::set_active(&db, user.id, !user.is_active).await?;
    flash::success(
        &cookies,
        format!(
            "{} is now {}.",
            user.username,
            if user.is_active { "active" } else { "inactive" }
        ),
    );
    Ok(redirect("/admin/users/"))
}

#[post("/users/{id}/delete/")]
pub async fn post_delete_user(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    form: web::Form<HashMap<String, String>>,
) -> Result<HttpResponse, Error> {
    validate_form_token(&cookies, &form)?;
    client.require_capability(Capabilities::MANAGE_USERS)?;
    let id = path.into_inner();
    not_self(&client, id, "delete")?;

    accounts::delete_user(&db, id).await?;
    flash::success(&cookies, "User deleted.");
    Ok(redirect("/admin/users/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_base_url() {
        assert_eq!(listing_base_url(None, &None), "/admin/users/?");
        assert_eq!(
            listing_base_url(Some(Role::Teacher), &Some("ann lee".to_owned())),
            "/admin/users/?role=teacher&q=ann+lee&"
        );
    }

    #[test]
    fn test_student_needs_level() {
        let form = UserForm {
            username: "stu1".to_owned(),
            email: "stu1@example.com".to_owned(),
            first_name: "Sam".to_owned(),
            last_name: "Stone".to_owned(),
            role: "student".to_owned(),
            password: "long-enough".to_owned(),
            ..Default::default()
        };
        let mut errors = FormErrors::new();
        form.to_new_user(&mut errors);
        assert!(errors.has("level"));

        let teacher = UserForm {
            role: "teacher".to_owned(),
            ..form
        };
        let mut errors = FormErrors::new();
        let new = teacher.to_new_user(&mut errors).expect("teacher form is complete");
        assert!(errors.is_empty());
        assert_eq!(new.role, Role::Teacher);
    }
}
