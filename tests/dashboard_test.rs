/// Integration tests for role dashboards
mod common;
use serial_test::serial;

use common::{database::*, fixtures::*};
use sacm::dashboard::{self, AdminStats, Dashboard};
use sacm::enrollment;
use sacm::lectures::{self, NewLectureFile};
use sacm::notifications::{self, NewNotification};
use sacm::storage::LocalStorage;
use std::collections::HashSet;

#[actix_rt::test]
#[serial]
async fn test_student_dashboard_matches_active_enrollments() {
    let db = setup_test_database().await.unwrap();
    let student = create_test_student(&db, "dash_student").await.unwrap();
    let cat = create_test_catalog(&db, None).await.unwrap();
    let second = create_test_course(&db, "NET102", cat.specialization.id, None)
        .await
        .unwrap();
    let third = create_test_course(&db, "NET103", cat.specialization.id, None)
        .await
        .unwrap();

    enrollment::enroll(&db, student.id, cat.course.id).await.unwrap();
    enrollment::enroll(&db, student.id, second.id).await.unwrap();
    let off = enrollment::enroll(&db, student.id, third.id).await.unwrap();
    enrollment::set_enrollment_active(&db, off.id, false).await.unwrap();

    let dash = match dashboard::build(&db, &student, 5).await.unwrap() {
        Dashboard::Student(dash) => dash,
        _ => panic!("A student should get the student dashboard"),
    };

    let mut ids: Vec<i32> = dash.enrollments.iter().map(|e| e.course.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![cat.course.id, second.id]);
    assert_eq!(dash.notifications_count, 0);
    assert!(dash.recent_files.is_empty());
}

#[actix_rt::test]
#[serial]
async fn test_student_dashboard_shows_only_targeted_notifications() {
    let db = setup_test_database().await.unwrap();
    let student = create_test_student(&db, "dash_notified").await.unwrap();
    let other = create_test_student(&db, "dash_bystander").await.unwrap();
    let cat = create_test_catalog(&db, None).await.unwrap();
    let dropped = create_test_course(&db, "NET102", cat.specialization.id, None)
        .await
        .unwrap();
    let unrelated = create_test_course(&db, "NET103", cat.specialization.id, None)
        .await
        .unwrap();

    enrollment::enroll(&db, student.id, cat.course.id).await.unwrap();
    let off = enrollment::enroll(&db, student.id, dropped.id).await.unwrap();
    enrollment::set_enrollment_active(&db, off.id, false).await.unwrap();
    enrollment::enroll(&db, other.id, unrelated.id).await.unwrap();

    let mut expected = HashSet::new();
    for i in 0..3 {
        let mut direct = NewNotification::new(&format!("Direct {}", i), "For you.");
        direct.recipient_id = Some(student.id);
        expected.insert(notifications::send(&db, direct).await.unwrap().id);

        let mut broadcast = NewNotification::new(&format!("Course {}", i), "For the class.");
        broadcast.course_id = Some(cat.course.id);
        expected.insert(notifications::send(&db, broadcast).await.unwrap().id);
    }

    // None of these may reach the student
    notifications::send(&db, NewNotification::new("General", "Everyone."))
        .await
        .unwrap();
    let mut elsewhere = NewNotification::new("Private", "Not yours.");
    elsewhere.recipient_id = Some(other.id);
    notifications::send(&db, elsewhere).await.unwrap();
    let mut expired = NewNotification::new("Expired", "Too late.");
    expired.recipient_id = Some(student.id);
    expired.expiry_date = Some(chrono::Utc::now().naive_utc() - chrono::Duration::hours(1));
    notifications::send(&db, expired).await.unwrap();
    for course_id in [dropped.id, unrelated.id] {
        let mut broadcast = NewNotification::new("Other class", "Not enrolled.");
        broadcast.course_id = Some(course_id);
        notifications::send(&db, broadcast).await.unwrap();
    }

    let dash = dashboard::student_dashboard(&db, &student, 5).await.unwrap();
    assert_eq!(dash.notifications_count, 6);
    assert_eq!(dash.notifications.len(), 5, "The listing is capped");

    let shown: HashSet<i32> = dash.notifications.iter().map(|n| n.id).collect();
    assert_eq!(shown.len(), 5, "No notification is listed twice");
    assert!(shown.is_subset(&expected));

    // The bystander sees only their own message
    let (items, total) = notifications::unread_for_user(&db, &other, 5).await.unwrap();
    assert_eq!(total, 2);
    let titles: HashSet<&str> = items.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, HashSet::from(["Private", "Other class"]));
}

#[actix_rt::test]
#[serial]
async fn test_teacher_dashboard_counts_distinct_students() {
    let db = setup_test_database().await.unwrap();
    let media = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(media.path()).unwrap();
    let teacher = create_test_teacher(&db, "dash_teacher").await.unwrap();
    let cat = create_test_catalog(&db, Some(teacher.id)).await.unwrap();
    let second = create_test_course(&db, "NET102", cat.specialization.id, Some(teacher.id))
        .await
        .unwrap();

    let shared = create_test_student(&db, "dash_shared").await.unwrap();
    let only_first = create_test_student(&db, "dash_first").await.unwrap();
    enrollment::enroll(&db, shared.id, cat.course.id).await.unwrap();
    enrollment::enroll(&db, shared.id, second.id).await.unwrap();
    enrollment::enroll(&db, only_first.id, cat.course.id).await.unwrap();

    lectures::upload(
        &db,
        &storage,
        NewLectureFile {
            title: "Intro".to_owned(),
            description: None,
            chapter: None,
            course_id: second.id,
            file_type: None,
            uploaded_by_id: Some(teacher.id),
            filename: "intro.pdf".to_owned(),
            data: vec![1u8; 32],
        },
    )
    .await
    .unwrap();

    let dash = dashboard::teacher_dashboard(&db, &teacher, 5).await.unwrap();

    assert_eq!(dash.courses.len(), 2);
    assert_eq!(dash.total_students, 2, "A student in two courses counts once");
    assert_eq!(dash.total_files, 1);
    assert_eq!(dash.recent_files.len(), 1);
    assert_eq!(dash.recent_files[0].course_name(), "Course NET102");

    let first = dash
        .courses
        .iter()
        .find(|c| c.course.id == cat.course.id)
        .unwrap();
    assert_eq!(first.students_count, 2);
    assert_eq!(first.files_count, 0);

    let other = dash.courses.iter().find(|c| c.course.id == second.id).unwrap();
    assert_eq!(other.students_count, 1);
    assert_eq!(other.files_count, 1);
}

#[actix_rt::test]
#[serial]
async fn test_admin_stats() {
    let db = setup_test_database().await.unwrap();
    create_test_admin(&db, "dash_admin").await.unwrap();
    let teacher = create_test_teacher(&db, "dash_t").await.unwrap();
    create_test_student(&db, "dash_s1").await.unwrap();
    create_test_student(&db, "dash_s2").await.unwrap();
    let cat = create_test_catalog(&db, Some(teacher.id)).await.unwrap();

    let mut retired = sacm::catalog::CourseInput::new("Retired", "OLD100", cat.specialization.id, 2);
    retired.is_active = false;
    sacm::catalog::create_course(&db, retired).await.unwrap();

    let stats = dashboard::admin_stats(&db).await.unwrap();
    assert_eq!(
        stats,
        AdminStats {
            total_users: 4,
            total_students: 2,
            total_teachers: 1,
            total_courses: 1,
            total_departments: 1,
            total_files: 0,
        }
    );

    let dash = dashboard::admin_dashboard(&db, 3).await.unwrap();
    assert_eq!(dash.recent_users.len(), 3);
}
