//! Lecture file download, delete and visibility toggle.

use super::{db_err, redirect};
use crate::access::{can_manage_course, can_view_course};
use crate::catalog;
use crate::flash;
use crate::lectures;
use crate::middleware::csrf::validate_form_token;
use crate::middleware::ClientCtx;
use crate::orm::users::Role;
use crate::orm::{courses, lecture_files};
use crate::permission::Capabilities;
use crate::storage::StorageBackend;
use actix_web::http::header::{
    self, ContentDisposition, DispositionParam, DispositionType,
};
use actix_web::body::SizedStream;
use actix_web::http::StatusCode;
use actix_web::{error, get, post, web, Error, HttpRequest, HttpResponse};
use sea_orm::DatabaseConnection;
use std::collections::HashMap;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(download_file)
        .service(delete_file)
        .service(toggle_file);
}

/// File and course, if the caller may see the file at all. Inactive files
/// are visible to course managers only.
pub(super) async fn visible_file(
    client: &ClientCtx,
    db: &DatabaseConnection,
    id: i32,
) -> Result<(lecture_files::Model, courses::Model), Error> {
    let user = client.require_login()?;
    let file = lectures::find_file(db, id).await?;
    let course = catalog::find_course(db, file.course_id).await?;

    if !can_view_course(db, user, &course).await.map_err(db_err)? {
        return Err(error::ErrorForbidden("You are not enrolled in this course."));
    }
    if !file.is_active && !can_manage_course(user, &course) {
        return Err(error::ErrorNotFound("File not found"));
    }
    Ok((file, course))
}

async fn managed_file(
    client: &ClientCtx,
    db: &DatabaseConnection,
    id: i32,
    cap: Capabilities,
) -> Result<(lecture_files::Model, courses::Model), Error> {
    let user = client.require_role(&[Role::Teacher, Role::Admin])?;
    let file = lectures::find_file(db, id).await?;
    let course = catalog::find_course(db, file.course_id).await?;
    if !can_manage_course(user, &course) {
        return Err(error::ErrorForbidden("You do not teach this course."));
    }
    client.require_capability(cap)?;
    Ok((file, course))
}

/// Full requests and ranges from offset zero start a download. Any other
/// range continues one already counted.
fn starts_download(range: Option<&str>) -> bool {
    let range = match range {
        Some(range) => range,
        None => return true,
    };
    range
        .trim()
        .strip_prefix("bytes=")
        .and_then(|spec| spec.split(',').next())
        .and_then(|first| first.split_once('-'))
        .map_or(false, |(start, _)| start.trim() == "0")
}

#[get("/{id}/download/")]
pub async fn download_file(
    client: ClientCtx,
    req: HttpRequest,
    db: web::Data<DatabaseConnection>,
    storage: web::Data<dyn StorageBackend>,
    path: web::Path<i32>,
) -> Result<HttpResponse, Error> {
    let (file, _) = visible_file(&client, &db, path.into_inner()).await?;

    let range = req
        .headers()
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let object = storage
        .get_object(&file.file, range.clone())
        .await
        .map_err(crate::error::AcademyError::from)?;

    if starts_download(range.as_deref()) {
        lectures::record_download(&db, file.id).await.map_err(db_err)?;
    }

    let status = if object.content_range.is_some() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    let mut res = HttpResponse::build(status);
    res.insert_header(ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(file.file_name().to_owned())],
    });
    if let Some(ct) = object.content_type {
        res.insert_header((header::CONTENT_TYPE, ct));
    }
    if let Some(cr) = object.content_range {
        res.insert_header((header::CONTENT_RANGE, cr));
    }
    if let Some(ar) = object.accept_ranges {
        res.insert_header((header::ACCEPT_RANGES, ar));
    }
    if let Some(etag) = object.e_tag {
        res.insert_header((header::ETAG, etag));
    }
    if let Some(lm) = object.last_modified {
        res.insert_header((header::LAST_MODIFIED, lm));
    }

    Ok(match object.content_length {
        Some(len) if len >= 0 => res.body(SizedStream::new(len as u64, object.body)),
        _ => res.streaming(object.body),
    })
}

#[post("/{id}/delete/")]
pub async fn delete_file(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    storage: web::Data<dyn StorageBackend>,
    path: web::Path<i32>,
    form: web::Form<HashMap<String, String>>,
) -> Result<HttpResponse, Error> {
    validate_form_token(&cookies, &form)?;
    let (file, course) = managed_file(&client, &db, path.into_inner(), Capabilities::DELETE_FILES).await?;

    lectures::delete_file(&db, storage.get_ref(), file.id).await?;
    flash::success(&cookies, format!("\"{}\" has been deleted.", file.title));
    Ok(redirect(&format!("/courses/{}/", course.id)))
}

#[post("/{id}/toggle/")]
pub async fn toggle_file(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    form: web::Form<HashMap<String, String>>,
) -> Result<HttpResponse, Error> {
    validate_form_token(&cookies, &form)?;
    let (file, course) = managed_file(&client, &db, path.into_inner(), Capabilities::UPLOAD_FILES).await?;

    let file = lectures::set_file_active(&db, file.id, !file.is_active).await?;
    let state = if file.is_active { "visible" } else { "hidden" };
    flash::info(&cookies, format!("\"{}\" is now {}.", file.title, state));
    Ok(redirect(&format!("/courses/{}/", course.id)))
}

#[cfg(test)]
mod tests {
    use super::starts_download;

    #[test]
    fn test_starts_download() {
        assert!(starts_download(None));
        assert!(starts_download(Some("bytes=0-")));
        assert!(starts_download(Some("bytes=0-1023")));
        assert!(!starts_download(Some("bytes=1024-")));
        assert!(!starts_download(Some("bytes=-500")));
        assert!(!starts_download(Some("garbage")));
    }
}
