use crate::catalog::{self, SpecializationInput, SpecializationRow};
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
    conf.service(view_specializations)
        .service(view_new_specialization)
        .service(post_new_specialization)
        .service(view_edit_specialization)
        .service(post_edit_specialization)
        .service(post_delete_specialization);
}

#[derive(Deserialize)]
pub struct SpecializationQuery {
    pub department_id: Option<String>,
}

#[derive(Template)]
#[template(path = "admin/specializations.html")]
pub struct SpecializationsTemplate {
    pub client: ClientCtx,
    pub rows: Vec<SpecializationRow>,
    pub departments: Vec<SelectOption>,
}

#[derive(Template)]
#[template(path = "admin/specialization_form.html")]
pub struct SpecializationFormTemplate {
    pub client: ClientCtx,
    pub specialization_id: Option<i32>,
    pub form: SpecializationForm,
    pub departments: Vec<SelectOption>,
    pub errors: FormErrors,
}

#[derive(Default, Deserialize)]
pub struct SpecializationForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub csrf_token: String,
}

impl SpecializationForm {
    fn to_input(&self, errors: &mut FormErrors) -> Option<SpecializationInput> {
        if self.name.trim().is_empty() {
            errors.add("name", "This field is required.");
        }
        let department_id = parse_id(Some(&self.department));
        if department_id.is_none() {
            errors.add("department", "Choose a department.");
        }
        Some(SpecializationInput {
            name: self.name.trim().to_owned(),
            department_id: department_id?,
            description: non_empty(&self.description),
        })
    }
}

async fn department_options(
    db: &DatabaseConnection,
    selected: Option<i32>,
) -> Result<Vec<SelectOption>, Error> {
    let deps = catalog::all_departments(db).await.map_err(db_err)?;
    Ok(id_options(deps.into_iter().map(|d| (d.id, d.name)), selected))
}

async fn render_form(
    client: ClientCtx,
    db: &DatabaseConnection,
    specialization_id: Option<i32>,
    form: SpecializationForm,
    errors: FormErrors,
) -> Result<HttpResponse, Error> {
    let departments = department_options(db, parse_id(Some(&form.department))).await?;
    Ok(SpecializationFormTemplate {
        client,
        specialization_id,
        form,
        departments,
        errors,
    }
    .to_response())
}

#[get("/specializations/")]
pub async fn view_specializations(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    query: web::Query<SpecializationQuery>,
) -> Result<HttpResponse, Error> {
    client.require_capability(Capabilities::MANAGE_COURSES)?;
    let department_id = parse_id(query.department_id.as_deref());
    let rows = catalog::list_specializations(&db, department_id)
        .await
        .map_err(db_err)?;

    let mut departments = vec![SelectOption {
        value: String::new(),
        label: "All departments".to_owned(),
        selected: department_id.is_none(),
    }];
    departments.extend(department_options(&db, department_id).await?);

    Ok(SpecializationsTemplate {
        client,
        rows,
        departments,
    }
    .to_response())
}

#[get("/specializations/new/")]
pub async fn view_new_specialization(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    query: web::Query<SpecializationQuery>,
) -> Result<HttpResponse, Error> {
    client.require_capability(Capabilities::MANAGE_COURSES)?;
    let form = SpecializationForm {
        department: query.department_id.clone().unwrap_or_default(),
        ..Default::default()
    };
    render_form(client, &db, None, form, FormErrors::new()).await
}

#[post("/specializations/new/")]
pub async fn post_new_specialization(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    form: web::Form<SpecializationForm>,
) -> Result<HttpResponse, Error> {
    validate_csrf_token(&cookies, &form.csrf_token)?;
    client.require_capability(Capabilities::MANAGE_COURSES)?;
    let form = form.into_inner();

    let mut errors = FormErrors::new();
    let input = form.to_input(&mut errors);
    if let (true, Some(input)) = (errors.is_empty(), input) {
        match catalog::create_specialization(&db, input).await {
            Ok(spec) => {
                flash::success(&cookies, format!("Specialization \"{}\" created.", spec.name));
                return Ok(redirect("/admin/specializations/"));
            }
            Err(e) => errors.absorb(e)?,
        }
    }
    render_form(client, &db, None, form, errors).await
}

#[get("/specializations/{id}/edit/")]
pub async fn view_edit_specialization(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, Error> {
    client.require_capability(Capabilities::MANAGE_COURSES)?;
    let spec = catalog::find_specialization(&db, path.into_inner()).await?;
    let form = SpecializationForm {
        name: spec.name,
        department: spec.department_id.to_string(),
        description: spec.description,
        csrf_token: String::new(),
    };
    render_form(client, &db, Some(spec.id), form, FormErrors::new()).await
}

#[post("/specializations/{id}/edit/")]
pub async fn post_edit_specialization(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    form: web::Form<SpecializationForm>,
) -> Result<HttpResponse, Error> {
    validate_csrf_token(&cookies, &form.csrf_token)?;
    client.require_capability(Capabilities::MANAGE_COURSES)?;
    let id = path.into_inner();
    let form = form.into_inner();

    let mut errors = FormErrors::new();
    let input = form.to_input(&mut errors);
    if let (true, Some(input)) = (errors.is_empty(), input) {
        match catalog::update_specialization(&db, id, input).await {
            Ok(spec) => {
                flash::success(&cookies, format!("Specialization \"{}\" updated.", spec.name));
                return Ok(redirect("/admin/specializations/"));
            }
            Err(e) => errors.absorb(e)?,
        }
    }
    render_form(client, &db, Some(id), form, errors).await
}

#[post("/specializations/{id}/delete/")]
pub async fn post_delete_specialization(
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

    let course_ids = catalog::course_ids_in_specialization(&db, id)
        .await
        .map_err(db_err)?;
    let keys = lectures::stored_keys(&db, &course_ids).await.map_err(db_err)?;
    catalog::delete_specialization(&db, id).await?;
    lectures::purge_stored(storage.get_ref(), keys).await;

    flash::success(&cookies, "Specialization deleted.");
    Ok(redirect("/admin/specializations/"))
}
