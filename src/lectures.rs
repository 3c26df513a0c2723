//! Lecture files: upload, size derivation, downloads and listings.

use crate::constants::ALLOWED_LECTURE_EXTENSIONS;
use crate::error::AcademyError;
use crate::orm::courses;
use crate::orm::lecture_files::{self, FileType};
use crate::storage::{extension_of, lecture_key, StorageBackend};
use sea_orm::{
    entity::*, query::*, sea_query::Expr, ActiveValue, DatabaseConnection, DbErr, TransactionTrait,
};

/// A lecture upload as received from a form.
pub struct NewLectureFile {
    pub title: String,
    pub description: Option<String>,
    pub chapter: Option<String>,
    pub course_id: i32,
    /// Inferred from the extension when absent.
    pub file_type: Option<FileType>,
    pub uploaded_by_id: Option<i32>,
    pub filename: String,
    pub data: Vec<u8>,
}

/// A file together with the course it belongs to.
pub struct FileWithCourse {
    pub file: lecture_files::Model,
    pub course: Option<courses::Model>,
}

impl FileWithCourse {
    pub fn course_name(&self) -> &str {
        self.course.as_ref().map_or("-", |c| c.name.as_str())
    }
}

fn with_course(rows: Vec<(lecture_files::Model, Option<courses::Model>)>) -> Vec<FileWithCourse> {
    rows.into_iter()
        .map(|(file, course)| FileWithCourse { file, course })
        .collect()
}

/// Returns the lower-cased extension when it is allowed for lectures.
pub fn validate_lecture_extension(filename: &str) -> Result<String, AcademyError> {
    match extension_of(filename) {
        Some(ext) if ALLOWED_LECTURE_EXTENSIONS.contains(&ext.as_str()) => Ok(ext),
        _ => Err(AcademyError::invalid(format!(
            "File type not allowed. Allowed types: {}",
            ALLOWED_LECTURE_EXTENSIONS.join(", ")
        ))),
    }
}

/// Stores the bytes and records the file. Nothing is written when the
/// extension is rejected; stored bytes are removed again when the row
/// cannot be saved.
pub async fn upload(
    db: &DatabaseConnection,
    storage: &dyn StorageBackend,
    new: NewLectureFile,
) -> Result<lecture_files::Model, AcademyError> {
    let ext = validate_lecture_extension(&new.filename)?;
    if new.title.trim().is_empty() {
        return Err(AcademyError::invalid("A title is required."));
    }
    courses::Entity::find_by_id(new.course_id)
        .one(db)
        .await?
        .ok_or(AcademyError::NotFound("Course"))?;

    let key = lecture_key(chrono::Utc::now().naive_utc(), &new.filename);
    storage.put_object(new.data, &key).await?;

    let active = lecture_files::ActiveModel {
        title: Set(new.title.trim().to_owned()),
        description: Set(new.description),
        file: Set(key.clone()),
        file_type: Set(new.file_type.unwrap_or_else(|| FileType::from_extension(&ext))),
        course_id: Set(new.course_id),
        chapter: Set(new.chapter),
        uploaded_by_id: Set(new.uploaded_by_id),
        ..Default::default()
    };

    match save(db, storage, active).await {
        Ok(model) => {
            log::info!("Stored lecture file {} ({} bytes)", model.file, model.file_size);
            Ok(model)
        }
        Err(err) => {
            if let Err(e) = storage.delete(&key).await {
                log::warn!("Failed to remove orphaned upload {}: {}", key, e);
            }
            Err(err)
        }
    }
}

/// Inserts or updates a lecture file. The size is always re-read from
/// storage; whatever `file_size` the caller set is discarded.
pub async fn save(
    db: &DatabaseConnection,
    storage: &dyn StorageBackend,
    mut active: lecture_files::ActiveModel,
) -> Result<lecture_files::Model, AcademyError> {
    let key = match &active.file {
        ActiveValue::Set(key) | ActiveValue::Unchanged(key) => key.clone(),
        ActiveValue::NotSet => return Err(AcademyError::invalid("A lecture file needs a stored file.")),
    };
    let size = storage.size(&key).await?;
    active.file_size = Set(size as i64);

    let txn = db.begin().await?;
    let model = match active.id {
        ActiveValue::NotSet => active.insert(&txn).await?,
        _ => active.update(&txn).await?,
    };
    txn.commit().await?;

    Ok(model)
}

pub async fn find_file(db: &DatabaseConnection, id: i32) -> Result<lecture_files::Model, AcademyError> {
    lecture_files::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AcademyError::NotFound("File"))
}

/// Single `UPDATE ... SET download_count = download_count + 1`.
pub async fn record_download(db: &DatabaseConnection, id: i32) -> Result<(), DbErr> {
    lecture_files::Entity::update_many()
        .col_expr(
            lecture_files::Column::DownloadCount,
            Expr::col(lecture_files::Column::DownloadCount).add(1),
        )
        .filter(lecture_files::Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}

/// Deletes the row, then the stored bytes.
pub async fn delete_file(
    db: &DatabaseConnection,
    storage: &dyn StorageBackend,
    id: i32,
) -> Result<lecture_files::Model, AcademyError> {
    let file = find_file(db, id).await?;
    lecture_files::Entity::delete_many()
        .filter(lecture_files::Column::Id.eq(file.id))
        .exec(db)
        .await?;

    if let Err(e) = storage.delete(&file.file).await {
        log::warn!("Lecture file {} deleted but bytes remain at {}: {}", file.id, file.file, e);
    }
    log::info!("Deleted lecture file {} from course {}", file.id, file.course_id);
    Ok(file)
}

pub async fn set_file_active(
    db: &DatabaseConnection,
    id: i32,
    is_active: bool,
) -> Result<lecture_files::Model, AcademyError> {
    let file = find_file(db, id).await?;
    let mut active: lecture_files::ActiveModel = file.into();
    active.is_active = Set(is_active);
    Ok(active.update(db).await?)
}

/// Files of one course, newest first. Inactive files only for staff views.
pub async fn course_files(
    db: &DatabaseConnection,
    course_id: i32,
    include_inactive: bool,
) -> Result<Vec<lecture_files::Model>, DbErr> {
    let mut query = lecture_files::Entity::find().filter(lecture_files::Column::CourseId.eq(course_id));
    if !include_inactive {
        query = query.filter(lecture_files::Column::IsActive.eq(true));
    }
    query
        .order_by_desc(lecture_files::Column::UploadedAt)
        .order_by_desc(lecture_files::Column::Id)
        .all(db)
        .await
}

/// Newest active files across the given courses.
pub async fn recent_files_in_courses(
    db: &DatabaseConnection,
    course_ids: &[i32],
    limit: u64,
) -> Result<Vec<FileWithCourse>, DbErr> {
    if course_ids.is_empty() {
        return Ok(Vec::new());
    }
    lecture_files::Entity::find()
        .find_also_related(courses::Entity)
        .filter(lecture_files::Column::CourseId.is_in(course_ids.to_vec()))
        .filter(lecture_files::Column::IsActive.eq(true))
        .order_by_desc(lecture_files::Column::UploadedAt)
        .order_by_desc(lecture_files::Column::Id)
        .limit(limit)
        .all(db)
        .await
        .map(with_course)
}

pub async fn recent_uploads_by(
    db: &DatabaseConnection,
    user_id: i32,
    limit: u64,
) -> Result<Vec<FileWithCourse>, DbErr> {
    lecture_files::Entity::find()
        .find_also_related(courses::Entity)
        .filter(lecture_files::Column::UploadedById.eq(user_id))
        .order_by_desc(lecture_files::Column::UploadedAt)
        .order_by_desc(lecture_files::Column::Id)
        .limit(limit)
        .all(db)
        .await
        .map(with_course)
}

pub async fn recent_files(db: &DatabaseConnection, limit: u64) -> Result<Vec<FileWithCourse>, DbErr> {
    lecture_files::Entity::find()
        .find_also_related(courses::Entity)
        .order_by_desc(lecture_files::Column::UploadedAt)
        .order_by_desc(lecture_files::Column::Id)
        .limit(limit)
        .all(db)
        .await
        .map(with_course)
}

/// Storage keys of every file in the given courses.
pub async fn stored_keys(db: &DatabaseConnection, course_ids: &[i32]) -> Result<Vec<String>, DbErr> {
    if course_ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(lecture_files::Entity::find()
        .filter(lecture_files::Column::CourseId.is_in(course_ids.to_vec()))
        .all(db)
        .await?
        .into_iter()
        .map(|f| f.file)
        .collect())
}

/// Removes bytes whose rows are already gone. Failures are logged only.
pub async fn purge_stored(storage: &dyn StorageBackend, keys: Vec<String>) {
    for key in keys {
        if let Err(e) = storage.delete(&key).await {
            log::warn!("Unable to remove stored file {}: {}", key, e);
        }
    }
}

pub async fn count_uploads_by(db: &DatabaseConnection, user_id: i32) -> Result<u64, DbErr> {
    Ok(lecture_files::Entity::find()
        .filter(lecture_files::Column::UploadedById.eq(user_id))
        .count(db)
        .await? as u64)
}
