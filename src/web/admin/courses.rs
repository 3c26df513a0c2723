use crate::accounts;
use crate::catalog::{self, CourseFilter, CourseInput, CourseRow};
use crate::constants::{DEFAULT_ACADEMIC_YEAR, DEFAULT_CREDIT_HOURS};
use crate::flash;
use crate::forms::{
    id_options, level_options, non_empty, parse_id, str_options, FormErrors, SelectOption,
};
use crate::lectures;
use crate::middleware::csrf::{validate_csrf_token, validate_form_token};
use crate::middleware::ClientCtx;
use crate::orm::courses::Semester;
use crate::permission::Capabilities;
use crate::storage::StorageBackend;
use crate::web::{db_err, redirect};
use actix_web::{get, post, web, Error, HttpResponse};
use askama_actix::{Template, TemplateToResponse};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;

pub(super) fn configure(conf: &mut web::ServiceConfig) {
    conf.service(view_courses)
        .service(view_new_course)
        .service(post_new_course)
        .service(view_edit_course)
        .service(post_edit_course)
        .service(post_delete_course);
}

#[derive(Default, Deserialize)]
pub struct CourseQuery {
    pub specialization_id: Option<String>,
    pub level: Option<String>,
    pub semester: Option<String>,
    pub q: Option<String>,
}

impl CourseQuery {
    fn to_filter(&self) -> CourseFilter {
        CourseFilter {
            specialization_id: parse_id(self.specialization_id.as_deref()),
            level: parse_id(self.level.as_deref()),
            semester: self
                .semester
                .as_deref()
                .and_then(|s| Semester::from_str(s).ok()),
            is_active: None,
            q: non_empty(&self.q),
        }
    }
}

#[derive(Template)]
#[template(path = "admin/courses.html")]
pub struct CoursesTemplate {
    pub client: ClientCtx,
    pub rows: Vec<CourseRow>,
    pub q: String,
    pub specializations: Vec<SelectOption>,
    pub levels: Vec<SelectOption>,
    pub semesters: Vec<SelectOption>,
}

#[derive(Template)]
#[template(path = "admin/course_form.html")]
pub struct CourseFormTemplate {
    pub client: ClientCtx,
    pub course_id: Option<i32>,
    pub form: CourseForm,
    pub specializations: Vec<SelectOption>,
    pub levels: Vec<SelectOption>,
    pub semesters: Vec<SelectOption>,
    pub teachers: Vec<SelectOption>,
    pub errors: FormErrors,
}

#[derive(Deserialize)]
pub struct CourseForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub specialization: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub semester: String,
    #[serde(default)]
    pub academic_year: String,
    #[serde(default)]
    pub credit_hours: String,
    #[serde(default)]
    pub teacher: Option<String>,
    /// Checkbox; absent when unchecked.
    #[serde(default)]
    pub is_active: Option<String>,
    #[serde(default)]
    pub csrf_token: String,
}

impl Default for CourseForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            code: String::new(),
            description: None,
            specialization: String::new(),
            level: "1".to_owned(),
            semester: Semester::default().as_str().to_owned(),
            academic_year: DEFAULT_ACADEMIC_YEAR.to_owned(),
            credit_hours: DEFAULT_CREDIT_HOURS.to_string(),
            teacher: None,
            is_active: Some("on".to_owned()),
            csrf_token: String::new(),
        }
    }
}

impl CourseForm {
    pub fn active_checked(&self) -> bool {
        self.is_active.is_some()
    }

    fn to_input(&self, errors: &mut FormErrors) -> Option<CourseInput> {
        for (field, value) in [
            ("name", &self.name),
            ("code", &self.code),
            ("academic_year", &self.academic_year),
        ] {
            if value.trim().is_empty() {
                errors.add(field, "This field is required.");
            }
        }
        let specialization_id = parse_id(Some(&self.specialization));
        if specialization_id.is_none() {
            errors.add("specialization", "Choose a specialization.");
        }
        let level = parse_id(Some(&self.level));
        if level.is_none() {
            errors.add("level", "Choose a level.");
        }
        let semester = Semester::from_str(&self.semester).ok();
        if semester.is_none() {
            errors.add("semester", "Choose a semester.");
        }
        let credit_hours = self.credit_hours.trim().parse::<i32>().ok();
        if credit_hours.is_none() {
            errors.add("credit_hours", "Enter a whole number.");
        }

        Some(CourseInput {
            name: self.name.trim().to_owned(),
            code: self.code.trim().to_owned(),
            description: non_empty(&self.description),
            specialization_id: specialization_id?,
            level: level?,
            semester: semester?,
            academic_year: self.academic_year.trim().to_owned(),
            credit_hours: credit_hours?,
            teacher_id: parse_id(self.teacher.as_deref()),
            is_active: self.active_checked(),
        })
    }
}

async fn specialization_options(
    db: &DatabaseConnection,
    selected: Option<i32>,
) -> Result<Vec<SelectOption>, Error> {
    let rows = catalog::list_specializations(db, None).await.map_err(db_err)?;
    Ok(id_options(
        rows.into_iter().map(|r| {
            (
                r.specialization.id,
                format!("{} / {}", r.department_name, r.specialization.name),
            )
        }),
        selected,
    ))
}

fn semester_options(selected: &str) -> Vec<SelectOption> {
    str_options(Semester::ALL.iter().map(|s| (s.as_str(), s.label())), selected)
}

fn blank(label: &str, selected: bool) -> SelectOption {
    SelectOption {
        value: String::new(),
        label: label.to_owned(),
        selected,
    }
}

async fn render_form(
    client: ClientCtx,
    db: &DatabaseConnection,
    course_id: Option<i32>,
    form: CourseForm,
    errors: FormErrors,
) -> Result<HttpResponse, Error> {
    let specializations = specialization_options(db, parse_id(Some(&form.specialization))).await?;
    let levels = level_options(parse_id(Some(&form.level)));
    let semesters = semester_options(&form.semester);

    let selected_teacher = parse_id(form.teacher.as_deref());
    let mut teachers = vec![blank("Unassigned", selected_teacher.is_none())];
    teachers.extend(id_options(
        accounts::teachers(db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(|t| (t.id, t.full_name())),
        selected_teacher,
    ));

    Ok(CourseFormTemplate {
        client,
        course_id,
        form,
        specializations,
        levels,
        semesters,
        teachers,
        errors,
    }
    .to_response())
}

#[get("/courses/")]
pub async fn view_courses(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    query: web::Query<CourseQuery>,
) -> Result<HttpResponse, Error> {
    client.require_capability(Capabilities::MANAGE_COURSES)?;
    let filter = query.to_filter();
    let rows = catalog::list_courses(&db, &filter).await.map_err(db_err)?;

    let mut specializations = vec![blank("All specializations", filter.specialization_id.is_none())];
    specializations.extend(specialization_options(&db, filter.specialization_id).await?);
    let mut levels = vec![blank("All levels", filter.level.is_none())];
    levels.extend(level_options(filter.level));
    let mut semesters = vec![blank("All semesters", filter.semester.is_none())];
    semesters.extend(semester_options(
        filter.semester.map(|s| s.as_str()).unwrap_or_default(),
    ));

    Ok(CoursesTemplate {
        client,
        rows,
        q: filter.q.unwrap_or_default(),
        specializations,
        levels,
        semesters,
    }
    .to_response())
}

#[get("/courses/new/")]
pub async fn view_new_course(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, Error> {
    client.require_capability(Capabilities::MANAGE_COURSES)?;
    render_form(client, &db, None, CourseForm::default(), FormErrors::new()).await
}

#[post("/courses/new/")]
pub async fn post_new_course(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    form: web::Form<CourseForm>,
) -> Result<HttpResponse, Error> {
    validate_csrf_token(&cookies, &form.csrf_token)?;
    client.require_capability(Capabilities::MANAGE_COURSES)?;
    let form = form.into_inner();

    let mut errors = FormErrors::new();
    let input = form.to_input(&mut errors);
    if let (true, Some(input)) = (errors.is_empty(), input) {
        match catalog::create_course(&db, input).await {
            Ok(course) => {
                flash::success(&cookies, format!("Course {} created.", course.code));
                return Ok(redirect("/admin/courses/"));
            }
            Err(e) => errors.absorb(e)?,
        }
    }
    render_form(client, &db, None, form, errors).await
}

#[get("/courses/{id}/edit/")]
pub async fn view_edit_course(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, Error> {
    client.require_capability(Capabilities::MANAGE_COURSES)?;
    let course = catalog::find_course(&db, path.into_inner()).await?;
    let form = CourseForm {
        name: course.name,
        code: course.code,
        description: course.description,
        specialization: course.specialization_id.to_string(),
        level: course.level.to_string(),
        semester: course.semester.as_str().to_owned(),
        academic_year: course.academic_year,
        credit_hours: course.credit_hours.to_string(),
        teacher: course.teacher_id.map(|id| id.to_string()),
        is_active: course.is_active.then(|| "on".to_owned()),
        csrf_token: String::new(),
    };
    render_form(client, &db, Some(course.id), form, FormErrors::new()).await
}

#[post("/courses/{id}/edit/")]
pub async fn post_edit_course(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    form: web::Form<CourseForm>,
) -> Result<HttpResponse, Error> {
    validate_csrf_token(&cookies, &form.csrf_token)?;
    client.require_capability(Capabilities::MANAGE_COURSES)?;
    let id = path.into_inner();
    let form = form.into_inner();

    let mut errors = FormErrors::new();
    let input = form.to_input(&mut errors);
    if let (true, Some(input)) = (errors.is_empty(), input) {
        match catalog::update_course(&db, id, input).await {
            Ok(course) => {
                flash::success(&cookies, format!("Course {} updated.", course.code));
                return Ok(redirect("/admin/courses/"));
            }
            Err(e) => errors.absorb(e)?,
        }
    }
    render_form(client, &db, Some(id), form, errors).await
}

#[post("/courses/{id}/delete/")]
pub async fn post_delete_course(
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

    let keys = lectures::stored_keys(&db, &[id]).await.map_err(db_err)?;
    let course = catalog::delete_course(&db, id).await?;
    lectures::purge_stored(storage.get_ref(), keys).await;

    flash::success(&cookies, format!("Course {} deleted.", course.code));
    Ok(redirect("/admin/courses/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_course_form_collects_every_error() {
        let form = CourseForm {
            level: "x".to_owned(),
            semester: "winter".to_owned(),
            credit_hours: "three".to_owned(),
            ..Default::default()
        };
        let mut errors = FormErrors::new();
        assert!(form.to_input(&mut errors).is_none());
        for field in ["name", "code", "specialization", "level", "semester", "credit_hours"] {
            assert!(errors.has(field), "missing error for {}", field);
        }
    }

    #[test]
    fn test_course_form_to_input() {
        let form = CourseForm {
            name: " Networks I ".to_owned(),
            code: "CN101".to_owned(),
            specialization: "4".to_owned(),
            teacher: Some(String::new()),
            is_active: None,
            ..Default::default()
        };
        let mut errors = FormErrors::new();
        let input = form.to_input(&mut errors).expect("valid form");
        assert!(errors.is_empty());
        assert_eq!(input.name, "Networks I");
        assert_eq!(input.specialization_id, 4);
        assert_eq!(input.teacher_id, None);
        assert!(!input.is_active);
    }
}
