//! Course page, lecture upload and course notifications.

use super::{db_err, redirect};
use crate::access::{can_manage_course, can_view_course};
use crate::catalog;
use crate::enrollment;
use crate::flash;
use crate::forms::{
    id_options, parse_datetime_local, parse_id, read_multipart, str_options, FormErrors,
    SelectOption,
};
use crate::lectures::{self, NewLectureFile};
use crate::middleware::csrf::validate_csrf_token;
use crate::middleware::ClientCtx;
use crate::notifications::{self, NewNotification};
use crate::orm::lecture_files::{self, FileType};
use crate::orm::notifications::{NotificationType, Priority};
use crate::orm::users::{self, Role};
use crate::orm::{courses, specializations};
use crate::permission::Capabilities;
use crate::storage::StorageBackend;
use actix_multipart::Multipart;
use actix_web::{error, get, post, web, Error, HttpResponse};
use askama_actix::{Template, TemplateToResponse};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::Deserialize;
use std::str::FromStr;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_course)
        .service(view_upload)
        .service(post_upload)
        .service(view_notify)
        .service(post_notify);
}

#[derive(Template)]
#[template(path = "courses/view.html")]
pub struct CourseTemplate {
    pub client: ClientCtx,
    pub course: courses::Model,
    pub specialization: Option<specializations::Model>,
    pub teacher: Option<users::Model>,
    pub files: Vec<lecture_files::Model>,
    pub enrolled_count: u64,
    pub can_manage: bool,
    pub can_upload: bool,
    pub can_delete: bool,
    pub can_notify: bool,
    pub can_use_ai: bool,
}

#[derive(Default)]
pub struct UploadValues {
    pub title: String,
    pub description: String,
    pub chapter: String,
}

#[derive(Template)]
#[template(path = "courses/upload.html")]
pub struct UploadTemplate {
    pub client: ClientCtx,
    pub course: courses::Model,
    pub values: UploadValues,
    pub file_types: Vec<SelectOption>,
    pub allowed: String,
    pub errors: FormErrors,
}

#[derive(Default, Deserialize)]
pub struct NotifyForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub notification_type: String,
    #[serde(default)]
    pub priority: String,
    /// Empty for the whole course, else a student id.
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub csrf_token: String,
}

#[derive(Template)]
#[template(path = "courses/notify.html")]
pub struct NotifyTemplate {
    pub client: ClientCtx,
    pub course: courses::Model,
    pub form: NotifyForm,
    pub recipients: Vec<SelectOption>,
    pub types: Vec<SelectOption>,
    pub priorities: Vec<SelectOption>,
    pub errors: FormErrors,
}

/// Loads the course if the caller may manage it and holds `cap`.
async fn managed_course(
    client: &ClientCtx,
    db: &DatabaseConnection,
    id: i32,
    cap: Capabilities,
) -> Result<courses::Model, Error> {
    let user = client.require_role(&[Role::Teacher, Role::Admin])?;
    let course = catalog::find_course(db, id).await?;
    if !can_manage_course(user, &course) {
        return Err(error::ErrorForbidden("You do not teach this course."));
    }
    client.require_capability(cap)?;
    Ok(course)
}

#[get("/{id}/")]
pub async fn view_course(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, Error> {
    let user = client.require_login()?.clone();
    let course = catalog::find_course(&db, path.into_inner()).await?;
    if !can_view_course(&db, &user, &course).await.map_err(db_err)? {
        return Err(error::ErrorForbidden("You are not enrolled in this course."));
    }

    let can_manage = can_manage_course(&user, &course);
    let files = lectures::course_files(&db, course.id, can_manage)
        .await
        .map_err(db_err)?;
    let specialization = specializations::Entity::find_by_id(course.specialization_id)
        .one(db.get_ref())
        .await
        .map_err(db_err)?;
    let teacher = match course.teacher_id {
        Some(id) => users::Entity::find_by_id(id)
            .one(db.get_ref())
            .await
            .map_err(db_err)?,
        None => None,
    };
    let enrolled_count = course.enrolled_students_count(&db).await.map_err(db_err)?;

    Ok(CourseTemplate {
        can_upload: can_manage && client.can(Capabilities::UPLOAD_FILES),
        can_delete: can_manage && client.can(Capabilities::DELETE_FILES),
        can_notify: can_manage && client.can(Capabilities::SEND_NOTIFICATIONS),
        can_use_ai: client.can(Capabilities::USE_AI),
        can_manage,
        client,
        course,
        specialization,
        teacher,
        files,
        enrolled_count,
    }
    .to_response())
}

fn file_type_options(selected: &str) -> Vec<SelectOption> {
    let mut opts = vec![SelectOption {
        value: String::new(),
        label: "Detect from file".to_owned(),
        selected: selected.is_empty(),
    }];
    opts.extend(str_options(
        FileType::ALL.iter().map(|t| (t.as_str(), t.label())),
        selected,
    ));
    opts
}

fn allowed_extensions() -> String {
    crate::constants::ALLOWED_LECTURE_EXTENSIONS.join(", ")
}

#[get("/{id}/upload/")]
pub async fn view_upload(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, Error> {
    let course = managed_course(&client, &db, path.into_inner(), Capabilities::UPLOAD_FILES).await?;
    Ok(UploadTemplate {
        client,
        course,
        values: UploadValues::default(),
        file_types: file_type_options(""),
        allowed: allowed_extensions(),
        errors: FormErrors::new(),
    }
    .to_response())
}

#[post("/{id}/upload/")]
pub async fn post_upload(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    storage: web::Data<dyn StorageBackend>,
    path: web::Path<i32>,
    payload: Multipart,
) -> Result<HttpResponse, Error> {
    let course = managed_course(&client, &db, path.into_inner(), Capabilities::UPLOAD_FILES).await?;
    let limit = crate::app_config::limits().max_upload_bytes();
    let mut form = read_multipart(payload, limit).await?;
    validate_csrf_token(&cookies, form.text("csrf_token").unwrap_or_default())?;

    let values = UploadValues {
        title: form.text("title").unwrap_or_default().to_owned(),
        description: form.text("description").unwrap_or_default().to_owned(),
        chapter: form.text("chapter").unwrap_or_default().to_owned(),
    };
    let type_value = form.text("file_type").unwrap_or_default().to_owned();
    let file_type = FileType::from_str(&type_value).ok();

    let mut errors = FormErrors::new();
    if values.title.is_empty() {
        errors.add("title", "This field is required.");
    }
    let file = form.take_file("file");
    if file.is_none() {
        errors.add("file", "Please choose a file to upload.");
    }

    if let (true, Some(file)) = (errors.is_empty(), file) {
        let new = NewLectureFile {
            title: values.title.clone(),
            description: Some(values.description.clone()).filter(|d| !d.is_empty()),
            chapter: Some(values.chapter.clone()).filter(|c| !c.is_empty()),
            course_id: course.id,
            file_type,
            uploaded_by_id: client.get_id(),
            filename: file.filename,
            data: file.data,
        };
        match lectures::upload(&db, storage.get_ref(), new).await {
            Ok(saved) => {
                flash::success(&cookies, format!("\"{}\" has been uploaded.", saved.title));
                return Ok(redirect(&format!("/courses/{}/", course.id)));
            }
            Err(crate::error::AcademyError::Invalid(msg)) => errors.add("file", msg),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(UploadTemplate {
        client,
        course,
        values,
        file_types: file_type_options(&type_value),
        allowed: allowed_extensions(),
        errors,
    }
    .to_response())
}

async fn render_notify(
    client: ClientCtx,
    db: &DatabaseConnection,
    course: courses::Model,
    form: NotifyForm,
    errors: FormErrors,
) -> Result<HttpResponse, Error> {
    let students = enrollment::students_of_course(db, course.id)
        .await
        .map_err(db_err)?;
    let selected = parse_id(form.recipient.as_deref());

    let mut recipients = vec![SelectOption {
        value: String::new(),
        label: "All enrolled students".to_owned(),
        selected: selected.is_none(),
    }];
    recipients.extend(id_options(
        students
            .into_iter()
            .map(|s| (s.id, format!("{} ({})", s.full_name(), s.username))),
        selected,
    ));

    let type_value = if form.notification_type.is_empty() {
        NotificationType::Course.as_str()
    } else {
        form.notification_type.as_str()
    };
    let priority_value = if form.priority.is_empty() {
        Priority::Normal.as_str()
    } else {
        form.priority.as_str()
    };
    let types = str_options(
        NotificationType::ALL.iter().map(|t| (t.as_str(), t.label())),
        type_value,
    );
    let priorities = str_options(Priority::ALL.iter().map(|p| (p.as_str(), p.label())), priority_value);

    Ok(NotifyTemplate {
        client,
        course,
        form,
        recipients,
        types,
        priorities,
        errors,
    }
    .to_response())
}

#[get("/{id}/notify/")]
pub async fn view_notify(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, Error> {
    let course = managed_course(&client, &db, path.into_inner(), Capabilities::SEND_NOTIFICATIONS).await?;
    render_notify(client, &db, course, NotifyForm::default(), FormErrors::new()).await
}

#[post("/{id}/notify/")]
pub async fn post_notify(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    form: web::Form<NotifyForm>,
) -> Result<HttpResponse, Error> {
    validate_csrf_token(&cookies, &form.csrf_token)?;
    let course = managed_course(&client, &db, path.into_inner(), Capabilities::SEND_NOTIFICATIONS).await?;
    let form = form.into_inner();

    let mut errors = FormErrors::new();
    if form.title.trim().is_empty() {
        errors.add("title", "This field is required.");
    }
    if form.content.trim().is_empty() {
        errors.add("content", "This field is required.");
    }
    let notification_type = NotificationType::from_str(&form.notification_type)
        .unwrap_or(NotificationType::Course);
    let priority = Priority::from_str(&form.priority).unwrap_or(Priority::Normal);
    let expiry_date = match form.expiry_date.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => match parse_datetime_local(Some(v)) {
            Some(dt) => Some(dt),
            None => {
                errors.add("expiry_date", "Enter a valid date and time.");
                None
            }
        },
        _ => None,
    };

    // A direct message must go to someone attending the course.
    let recipient_id = parse_id(form.recipient.as_deref());
    if let Some(id) = recipient_id {
        if !enrollment::is_actively_enrolled(&db, id, course.id)
            .await
            .map_err(db_err)?
        {
            errors.add("recipient", "Choose a student enrolled in this course.");
        }
    }

    if errors.is_empty() {
        let new = NewNotification {
            title: form.title.clone(),
            content: form.content.clone(),
            notification_type,
            priority,
            sender_id: client.get_id(),
            course_id: if recipient_id.is_some() { None } else { Some(course.id) },
            recipient_id,
            expiry_date,
        };
        match notifications::send(&db, new).await {
            Ok(_) => {
                flash::success(&cookies, "The notification has been sent.");
                return Ok(redirect(&format!("/courses/{}/", course.id)));
            }
            Err(e) => errors.absorb(e)?,
        }
    }

    render_notify(client, &db, course, form, errors).await
}
