/// Integration tests for the enrollment ledger
mod common;
use serial_test::serial;

use common::{database::*, fixtures::*};
use sacm::enrollment;
use sacm::AcademyError;

#[actix_rt::test]
#[serial]
async fn test_duplicate_enrollment_rejected() {
    let db = setup_test_database()
        .await
        .expect("Failed to connect to test database");
    let student = create_test_student(&db, "enroll_twice").await.unwrap();
    let cat = create_test_catalog(&db, None).await.unwrap();

    enrollment::enroll(&db, student.id, cat.course.id)
        .await
        .expect("First enrollment should succeed");

    let res = enrollment::enroll(&db, student.id, cat.course.id).await;
    assert!(matches!(res, Err(AcademyError::Duplicate("enrollment"))));

    // The unique index catches what the pre-check would have
    let res = enrollment::insert_enrollment(&db, student.id, cat.course.id).await;
    assert!(matches!(res, Err(AcademyError::Duplicate("enrollment"))));
}

#[actix_rt::test]
#[serial]
async fn test_only_students_enroll() {
    let db = setup_test_database().await.unwrap();
    let teacher = create_test_teacher(&db, "enroll_teacher").await.unwrap();
    let cat = create_test_catalog(&db, None).await.unwrap();

    let res = enrollment::enroll(&db, teacher.id, cat.course.id).await;
    assert!(matches!(res, Err(AcademyError::Invalid(_))));

    let res = enrollment::enroll(&db, 424242, cat.course.id).await;
    assert!(matches!(res, Err(AcademyError::NotFound(_))));
}

#[actix_rt::test]
#[serial]
async fn test_deactivated_enrollment_hidden_from_student() {
    let db = setup_test_database().await.unwrap();
    let student = create_test_student(&db, "enroll_toggle").await.unwrap();
    let cat = create_test_catalog(&db, None).await.unwrap();
    let second = create_test_course(&db, "NET102", cat.specialization.id, None)
        .await
        .unwrap();

    let first = enrollment::enroll(&db, student.id, cat.course.id).await.unwrap();
    enrollment::enroll(&db, student.id, second.id).await.unwrap();
    assert!(first.is_active, "New enrollments start active");

    enrollment::set_enrollment_active(&db, first.id, false)
        .await
        .unwrap();

    let active = enrollment::active_enrollments_for(&db, student.id).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].course.id, second.id);
    assert!(!enrollment::is_actively_enrolled(&db, student.id, cat.course.id)
        .await
        .unwrap());

    // Deactivation keeps the row
    let all = enrollment::list_enrollments(&db, Some(cat.course.id)).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].student.id, student.id);
}

#[actix_rt::test]
#[serial]
async fn test_students_of_course() {
    let db = setup_test_database().await.unwrap();
    let cat = create_test_catalog(&db, None).await.unwrap();
    let a = create_test_student(&db, "roster_a").await.unwrap();
    let b = create_test_student(&db, "roster_b").await.unwrap();
    enrollment::enroll(&db, a.id, cat.course.id).await.unwrap();
    let eb = enrollment::enroll(&db, b.id, cat.course.id).await.unwrap();
    enrollment::set_enrollment_active(&db, eb.id, false).await.unwrap();

    let roster = enrollment::students_of_course(&db, cat.course.id).await.unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].id, a.id);

    enrollment::delete_enrollment(&db, eb.id).await.unwrap();
    assert!(matches!(
        enrollment::find_enrollment(&db, eb.id).await,
        Err(AcademyError::NotFound(_))
    ));
}
