/// Integration tests for lecture file storage and bookkeeping
mod common;
use serial_test::serial;

use common::{database::*, fixtures::*};
use sacm::lectures::{self, NewLectureFile};
use sacm::orm::lecture_files::{self, FileType};
use sacm::storage::{LocalStorage, StorageBackend};
use sacm::AcademyError;
use sea_orm::{entity::*, ActiveValue::Set};
use std::path::Path;

fn upload_of(course_id: i32, filename: &str, len: usize) -> NewLectureFile {
    NewLectureFile {
        title: "Week 1".to_owned(),
        description: None,
        chapter: Some("Introduction".to_owned()),
        course_id,
        file_type: None,
        uploaded_by_id: None,
        filename: filename.to_owned(),
        data: vec![7u8; len],
    }
}

/// Regular files anywhere under `dir`.
fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| {
                    let path = e.path();
                    if path.is_dir() {
                        count_files(&path)
                    } else {
                        1
                    }
                })
                .sum()
        })
        .unwrap_or(0)
}

#[actix_rt::test]
#[serial]
async fn test_upload_records_stored_size() {
    let db = setup_test_database().await.unwrap();
    let media = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(media.path()).unwrap();
    let teacher = create_test_teacher(&db, "uploader").await.unwrap();
    let cat = create_test_catalog(&db, Some(teacher.id)).await.unwrap();

    let mut new = upload_of(cat.course.id, "Week1 Notes.PDF", 2048);
    new.uploaded_by_id = Some(teacher.id);
    let file = lectures::upload(&db, &storage, new)
        .await
        .expect("Upload should succeed");

    assert_eq!(file.file_size, 2048);
    assert_eq!(file.file_type, FileType::Pdf);
    assert_eq!(file.download_count, 0);
    assert!(file.is_active);
    assert!(file.file.starts_with("lectures/"));
    assert!(file.file.ends_with("_Week1_Notes.PDF"));
    assert!(storage.exists(&file.file).await.unwrap());
    assert_eq!(storage.size(&file.file).await.unwrap(), 2048);
}

#[actix_rt::test]
#[serial]
async fn test_rejected_extension_stores_nothing() {
    let db = setup_test_database().await.unwrap();
    let media = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(media.path()).unwrap();
    let cat = create_test_catalog(&db, None).await.unwrap();

    let res = lectures::upload(&db, &storage, upload_of(cat.course.id, "setup.exe", 16)).await;
    assert!(matches!(res, Err(AcademyError::Invalid(_))));

    assert_eq!(count_files(media.path()), 0, "Nothing should reach the media root");
    assert!(lecture_files::Entity::find().all(&db).await.unwrap().is_empty());
}

#[actix_rt::test]
#[serial]
async fn test_upload_to_missing_course_stores_nothing() {
    let db = setup_test_database().await.unwrap();
    let media = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(media.path()).unwrap();

    let res = lectures::upload(&db, &storage, upload_of(999, "notes.pdf", 16)).await;
    assert!(matches!(res, Err(AcademyError::NotFound("Course"))));
    assert_eq!(count_files(media.path()), 0);
}

#[actix_rt::test]
#[serial]
async fn test_save_ignores_caller_size() {
    let db = setup_test_database().await.unwrap();
    let media = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(media.path()).unwrap();
    let cat = create_test_catalog(&db, None).await.unwrap();
    let file = lectures::upload(&db, &storage, upload_of(cat.course.id, "slides.pptx", 300))
        .await
        .unwrap();
    assert_eq!(file.file_type, FileType::Ppt);

    let mut active: lecture_files::ActiveModel = file.into();
    active.title = Set("Week 1 (revised)".to_owned());
    active.file_size = Set(1);
    let saved = lectures::save(&db, &storage, active).await.unwrap();

    assert_eq!(saved.title, "Week 1 (revised)");
    assert_eq!(saved.file_size, 300);
}

#[actix_rt::test]
#[serial]
async fn test_record_download_increments() {
    let db = setup_test_database().await.unwrap();
    let media = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(media.path()).unwrap();
    let cat = create_test_catalog(&db, None).await.unwrap();
    let file = lectures::upload(&db, &storage, upload_of(cat.course.id, "lab.zip", 10))
        .await
        .unwrap();

    for _ in 0..3 {
        lectures::record_download(&db, file.id).await.unwrap();
    }

    let file = lectures::find_file(&db, file.id).await.unwrap();
    assert_eq!(file.download_count, 3);
}

#[actix_rt::test]
#[serial]
async fn test_inactive_files_hidden_from_listing() {
    let db = setup_test_database().await.unwrap();
    let media = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(media.path()).unwrap();
    let cat = create_test_catalog(&db, None).await.unwrap();
    let a = lectures::upload(&db, &storage, upload_of(cat.course.id, "a.pdf", 10))
        .await
        .unwrap();
    let b = lectures::upload(&db, &storage, upload_of(cat.course.id, "b.pdf", 10))
        .await
        .unwrap();

    lectures::set_file_active(&db, a.id, false).await.unwrap();

    let visible = lectures::course_files(&db, cat.course.id, false).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, b.id);

    let staff = lectures::course_files(&db, cat.course.id, true).await.unwrap();
    assert_eq!(staff.len(), 2);
}

#[actix_rt::test]
#[serial]
async fn test_delete_file_removes_bytes() {
    let db = setup_test_database().await.unwrap();
    let media = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(media.path()).unwrap();
    let cat = create_test_catalog(&db, None).await.unwrap();
    let file = lectures::upload(&db, &storage, upload_of(cat.course.id, "old.doc", 64))
        .await
        .unwrap();
    assert_eq!(file.file_type, FileType::Word);

    lectures::delete_file(&db, &storage, file.id).await.unwrap();

    assert!(!storage.exists(&file.file).await.unwrap());
    assert!(matches!(
        lectures::find_file(&db, file.id).await,
        Err(AcademyError::NotFound("File"))
    ));
}

#[actix_rt::test]
#[serial]
async fn test_course_delete_purges_stored_keys() {
    let db = setup_test_database().await.unwrap();
    let media = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(media.path()).unwrap();
    let cat = create_test_catalog(&db, None).await.unwrap();
    lectures::upload(&db, &storage, upload_of(cat.course.id, "one.pdf", 8))
        .await
        .unwrap();
    lectures::upload(&db, &storage, upload_of(cat.course.id, "two.mp4", 8))
        .await
        .unwrap();

    let keys = lectures::stored_keys(&db, &[cat.course.id]).await.unwrap();
    assert_eq!(keys.len(), 2);

    sacm::catalog::delete_course(&db, cat.course.id).await.unwrap();
    lectures::purge_stored(&storage, keys).await;

    assert!(lecture_files::Entity::find().all(&db).await.unwrap().is_empty());
    assert_eq!(count_files(media.path()), 0);
}
