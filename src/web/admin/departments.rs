use crate::accounts;
use crate::catalog::{self, DepartmentInput, DepartmentRow};
use crate::flash;
use crate::forms::{id_options, non_empty, parse_id, FormErrors, SelectOption};
use crate::lectures;
use crate::middleware::csrf::{validate_csrf_token, validate_form_token};
use crate::middleware::ClientCtx;
use crate::permission::Capabilities;
use crate::storage::StorageBackend;
use crate::web::{db_err, redirect};
use actix_web::{get, post, web, Error, HttpResponse};
use askama_actix::{Template, TemplateToResponse};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use std::collections::HashMap;

pub(super) fn configure(conf: &mut web::ServiceConfig) {
    conf.service(view_departments)
        .service(view_new_department)
        .service(post_new_department)
        .service(view_edit_department)
        .service(post_edit_department)
        .service(post_delete_department);
}

#[derive(Template)]
#[template(path = "admin/departments.html")]
pub struct DepartmentsTemplate {
    pub client: ClientCtx,
    pub rows: Vec<DepartmentRow>,
}

#[derive(Template)]
#[template(path = "admin/department_form.html")]
pub struct DepartmentFormTemplate {
    pub client: ClientCtx,
    /// None when creating.
    pub department_id: Option<i32>,
    pub form: DepartmentForm,
    pub heads: Vec<SelectOption>,
    pub errors: FormErrors,
}

#[derive(Default, Deserialize)]
pub struct DepartmentForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub head: Option<String>,
    #[serde(default)]
    pub csrf_token: String,
}

impl DepartmentForm {
    fn to_input(&self, errors: &mut FormErrors) -> DepartmentInput {
        if self.name.trim().is_empty() {
            errors.add("name", "This field is required.");
        }
        DepartmentInput {
            name: self.name.trim().to_owned(),
            description: non_empty(&self.description),
            head_id: parse_id(self.head.as_deref()),
        }
    }
}

async fn render_form(
    client: ClientCtx,
    db: &DatabaseConnection,
    department_id: Option<i32>,
    form: DepartmentForm,
    errors: FormErrors,
) -> Result<HttpResponse, Error> {
    let teachers = accounts::teachers(db).await.map_err(db_err)?;
    let mut heads = vec![SelectOption {
        value: String::new(),
        label: "No head".to_owned(),
        selected: parse_id(form.head.as_deref()).is_none(),
    }];
    heads.extend(id_options(
        teachers.into_iter().map(|t| (t.id, t.full_name())),
        parse_id(form.head.as_deref()),
    ));

    Ok(DepartmentFormTemplate {
        client,
        department_id,
        form,
        heads,
        errors,
    }
    .to_response())
}

#[get("/departments/")]
pub async fn view_departments(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, Error> {
    client.require_capability(Capabilities::MANAGE_COURSES)?;
    let rows = catalog::list_departments(&db).await.map_err(db_err)?;
    Ok(DepartmentsTemplate { client, rows }.to_response())
}

#[get("/departments/new/")]
pub async fn view_new_department(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, Error> {
    client.require_capability(Capabilities::MANAGE_COURSES)?;
    render_form(client, &db, None, DepartmentForm::default(), FormErrors::new()).await
}

#[post("/departments/new/")]
pub async fn post_new_department(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    form: web::Form<DepartmentForm>,
) -> Result<HttpResponse, Error> {
    validate_csrf_token(&cookies, &form.csrf_token)?;
    client.require_capability(Capabilities::MANAGE_COURSES)?;
    let form = form.into_inner();

    let mut errors = FormErrors::new();
    let input = form.to_input(&mut errors);
    if errors.is_empty() {
        match catalog::create_department(&db, input).await {
            Ok(dep) => {
                flash::success(&cookies, format!("Department \"{}\" created.", dep.name));
                return Ok(redirect("/admin/departments/"));
            }
            Err(e) => errors.absorb(e)?,
        }
    }
    render_form(client, &db, None, form, errors).await
}

#[get("/departments/{id}/edit/")]
pub async fn view_edit_department(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, Error> {
    client.require_capability(Capabilities::MANAGE_COURSES)?;
    let dep = catalog::find_department(&db, path.into_inner()).await?;
    let form = DepartmentForm {
        name: dep.name,
        description: dep.description,
        head: dep.head_id.map(|id| id.to_string()),
        csrf_token: String::new(),
    };
    render_form(client, &db, Some(dep.id), form, FormErrors::new()).await
}

#[post("/departments/{id}/edit/")]
pub async fn post_edit_department(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    form: web::Form<DepartmentForm>,
) -> Result<HttpResponse, Error> {
    validate_csrf_token(&cookies, &form.csrf_token)?;
    client.require_capability(Capabilities::MANAGE_COURSES)?;
    let id = path.into_inner();
    let form = form.into_inner();

    let mut errors = FormErrors::new();
    let input = form.to_input(&mut errors);
    if errors.is_empty() {
        match catalog::update_department(&db, id, input).await {
            Ok(dep) => {
                flash::success(&cookies, format!("Department \"{}\" updated.", dep.name));
                return Ok(redirect("/admin/departments/"));
            }
            Err(e) => errors.absorb(e)?,
        }
    }
    render_form(client, &db, Some(id), form, errors).await
}

#[post("/departments/{id}/delete/")]
pub async fn post_delete_department(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    storage: web::Data<dyn StorageBackend>,
    path: web::Path<i32>,
    form: web::Form<HashMap<String, String>>,
) -> Result<HttpResponse, Error> {
    validate_form_token(&cookies, &form)?;
    client.require_capability(Capabilities::MANAGE_COURSES)?;
    let id = path.into_inner();

    let course_ids = catalog::course_ids_in_department(&db, id).await.map_err(db_err)?;
    let keys = lectures::stored_keys(&db, &course_ids).await.map_err(db_err)?;
    catalog::delete_department(&db, id).await?;
    lectures::purge_stored(storage.get_ref(), keys).await;

    flash::success(&cookies, "Department deleted.");
    Ok(redirect("/admin/departments/"))
}
