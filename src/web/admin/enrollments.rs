use crate::accounts;
use crate::catalog;
use crate::enrollment::{self, EnrollmentRow};
use crate::flash;
use crate::forms::{id_options, parse_id, FormErrors, SelectOption};
use crate::middleware::csrf::{validate_csrf_token, validate_form_token};
use crate::middleware::ClientCtx;
use crate::permission::Capabilities;
use crate::web::{db_err, redirect};
use actix_web::{get, post, web, Error, HttpResponse};
use askama_actix::{Template, TemplateToResponse};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use std::collections::HashMap;

pub(super) fn configure(conf: &mut web::ServiceConfig) {
    conf.service(view_enrollments)
        .service(view_new_enrollment)
        .service(post_new_enrollment)
        .service(post_toggle_enrollment)
        .service(post_delete_enrollment);
}

#[derive(Deserialize)]
pub struct EnrollmentQuery {
    pub course_id: Option<String>,
}

#[derive(Template)]
#[template(path = "admin/enrollments.html")]
pub struct EnrollmentsTemplate {
    pub client: ClientCtx,
    pub rows: Vec<EnrollmentRow>,
    pub courses: Vec<SelectOption>,
}

#[derive(Template)]
#[template(path = "admin/enrollment_form.html")]
pub struct EnrollmentFormTemplate {
    pub client: ClientCtx,
    pub students: Vec<SelectOption>,
    pub courses: Vec<SelectOption>,
    pub errors: FormErrors,
}

#[derive(Default, Deserialize)]
pub struct EnrollmentForm {
    #[serde(default)]
    pub student: String,
    #[serde(default)]
    pub course: String,
    #[serde(default)]
    pub csrf_token: String,
}

async fn course_options(
    db: &DatabaseConnection,
    selected: Option<i32>,
) -> Result<Vec<SelectOption>, Error> {
    let courses = catalog::all_courses(db).await.map_err(db_err)?;
    Ok(id_options(
        courses
            .into_iter()
            .map(|c| (c.id, format!("{} {}", c.code, c.name))),
        selected,
    ))
}

async fn render_form(
    client: ClientCtx,
    db: &DatabaseConnection,
    form: &EnrollmentForm,
    errors: FormErrors,
) -> Result<HttpResponse, Error> {
    let students = accounts::students(db).await.map_err(db_err)?;
    Ok(EnrollmentFormTemplate {
        client,
        students: id_options(
            students
                .into_iter()
                .map(|s| (s.id, format!("{} ({})", s.full_name(), s.username))),
            parse_id(Some(&form.student)),
        ),
        courses: course_options(db, parse_id(Some(&form.course))).await?,
        errors,
    }
    .to_response())
}

/// Back to the list, keeping the course filter when there was one.
fn back_to_list(form: &HashMap<String, String>) -> HttpResponse {
    match parse_id(form.get("course_id").map(String::as_str)) {
        Some(id) => redirect(&format!("/admin/enrollments/?course_id={}", id)),
        None => redirect("/admin/enrollments/"),
    }
}

#[get("/enrollments/")]
pub async fn view_enrollments(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    query: web::Query<EnrollmentQuery>,
) -> Result<HttpResponse, Error> {
    client.require_capability(Capabilities::MANAGE_COURSES)?;
    let course_id = parse_id(query.course_id.as_deref());
    let rows = enrollment::list_enrollments(&db, course_id)
        .await
        .map_err(db_err)?;

    let mut courses = vec![SelectOption {
        value: String::new(),
        label: "All courses".to_owned(),
        selected: course_id.is_none(),
    }];
    courses.extend(course_options(&db, course_id).await?);

    Ok(EnrollmentsTemplate {
        client,
        rows,
        courses,
    }
    .to_response())
}

#[get("/enrollments/new/")]
pub async fn view_new_enrollment(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    query: web::Query<EnrollmentQuery>,
) -> Result<HttpResponse, Error> {
    client.require_capability(Capabilities::MANAGE_COURSES)?;
    let form = EnrollmentForm {
        course: query.course_id.clone().unwrap_or_default(),
        ..Default::default()
    };
    render_form(client, &db, &form, FormErrors::new()).await
}

#[post("/enrollments/new/")]
pub async fn post_new_enrollment(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    form: web::Form<EnrollmentForm>,
) -> Result<HttpResponse, Error> {
    validate_csrf_token(&cookies, &form.csrf_token)?;
    client.require_capability(Capabilities::MANAGE_COURSES)?;

    let mut errors = FormErrors::new();
    let student_id = parse_id(Some(&form.student));
    let course_id = parse_id(Some(&form.course));
    if student_id.is_none() {
        errors.add("student", "Choose a student.");
    }
    if course_id.is_none() {
        errors.add("course", "Choose a course.");
    }

    if let (Some(student_id), Some(course_id)) = (student_id, course_id) {
        match enrollment::enroll(&db, student_id, course_id).await {
            Ok(_) => {
                flash::success(&cookies, "Student enrolled.");
                return Ok(redirect(&format!("/admin/enrollments/?course_id={}", course_id)));
            }
            Err(crate::error::AcademyError::Duplicate(_)) => {
                errors.add_non_field("This student is already enrolled in this course.")
            }
            Err(e) => errors.absorb(e)?,
        }
    }
    render_form(client, &db, &form, errors).await
}

#[post("/enrollments/{id}/toggle/")]
pub async fn post_toggle_enrollment(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    form: web::Form<HashMap<String, String>>,
) -> Result<HttpResponse, Error> {
    validate_form_token(&cookies, &form)?;
    client.require_capability(Capabilities::MANAGE_COURSES)?;

    let existing = enrollment::find_enrollment(&db, path.into_inner()).await?;
    let updated = enrollment::set_enrollment_active(&db, existing.id, !existing.is_active).await?;
    flash::success(
        &cookies,
        if updated.is_active {
            "Enrollment activated."
        } else {
            "Enrollment deactivated."
        },
    );
    Ok(back_to_list(&form))
}

#[post("/enrollments/{id}/delete/")]
pub async fn post_delete_enrollment(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    form: web::Form<HashMap<String, String>>,
) -> Result<HttpResponse, Error> {
    validate_form_token(&cookies, &form)?;
    client.require_capability(Capabilities::MANAGE_COURSES)?;

    enrollment::delete_enrollment(&db, path.into_inner()).await?;
    flash::success(&cookies, "Enrollment removed.");
    Ok(back_to_list(&form))
}
