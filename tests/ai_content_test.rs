/// Integration tests for stored AI summaries and questions
mod common;
use serial_test::serial;

use common::{database::*, fixtures::*};
use sacm::ai_content::{self, NewQuestion};
use sacm::lectures::{self, NewLectureFile};
use sacm::orm::lecture_files;
use sacm::storage::LocalStorage;
use sacm::AcademyError;
use sea_orm::DatabaseConnection;

async fn stored_file(db: &DatabaseConnection, storage: &LocalStorage) -> lecture_files::Model {
    let cat = create_test_catalog(db, None).await.unwrap();
    lectures::upload(
        db,
        storage,
        NewLectureFile {
            title: "Routing basics".to_owned(),
            description: None,
            chapter: None,
            course_id: cat.course.id,
            file_type: None,
            uploaded_by_id: None,
            filename: "routing.pdf".to_owned(),
            data: vec![0u8; 128],
        },
    )
    .await
    .unwrap()
}

#[actix_rt::test]
#[serial]
async fn test_store_and_read_summary() {
    let db = setup_test_database().await.unwrap();
    let media = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(media.path()).unwrap();
    let file = stored_file(&db, &storage).await;

    assert!(ai_content::cached_summary(&db, file.id).await.unwrap().is_none());

    ai_content::store_summary(&db, file.id, "  Routers forward packets.  ", None)
        .await
        .unwrap();

    let cached = ai_content::cached_summary(&db, file.id)
        .await
        .unwrap()
        .expect("Summary should be cached");
    assert_eq!(cached.summary_text, "Routers forward packets.");
    assert_eq!(ai_content::summaries_for(&db, file.id).await.unwrap().len(), 1);

    assert!(matches!(
        ai_content::store_summary(&db, file.id, "   ", None).await,
        Err(AcademyError::Invalid(_))
    ));
    assert!(matches!(
        ai_content::store_summary(&db, 9999, "text", None).await,
        Err(AcademyError::NotFound("File"))
    ));
}

#[actix_rt::test]
#[serial]
async fn test_question_options_round_trip() {
    let db = setup_test_database().await.unwrap();
    let media = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(media.path()).unwrap();
    let file = stored_file(&db, &storage).await;

    let options = vec![
        "Network".to_owned(),
        "Transport".to_owned(),
        "Data link, framing".to_owned(),
    ];
    ai_content::store_question(
        &db,
        file.id,
        NewQuestion {
            question_text: "Which layer routes packets?".to_owned(),
            options: options.clone(),
            correct_answer: "Network".to_owned(),
            explanation: Some("IP lives at layer 3.".to_owned()),
        },
        None,
    )
    .await
    .unwrap();

    let stored = ai_content::questions_for(&db, file.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].options(), options);
    assert_eq!(stored[0].correct_answer, "Network");

    // Deleting the file takes its generated content with it
    lectures::delete_file(&db, &storage, file.id).await.unwrap();
    assert!(ai_content::questions_for(&db, file.id).await.unwrap().is_empty());
}
