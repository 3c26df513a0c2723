/// Integration tests for account creation, login and profile maintenance
mod common;
use serial_test::serial;

use common::{database::*, fixtures::*};
use sacm::accounts::{self, LoginOutcome, UserFilter};
use sacm::catalog::{self, DepartmentInput};
use sacm::orm::users::Role;
use sacm::AcademyError;

#[actix_rt::test]
#[serial]
async fn test_authenticate_outcomes() {
    let db = setup_test_database().await.unwrap();
    let user = create_test_student(&db, "login_user").await.unwrap();

    match accounts::authenticate(&db, "login_user", TEST_PASSWORD).await.unwrap() {
        LoginOutcome::Success(found) => assert_eq!(found.id, user.id),
        other => panic!("Expected success, got {:?}", other),
    }
    assert!(matches!(
        accounts::authenticate(&db, "login_user", "wrong-password").await.unwrap(),
        LoginOutcome::BadCredentials
    ));
    assert!(matches!(
        accounts::authenticate(&db, "nobody", TEST_PASSWORD).await.unwrap(),
        LoginOutcome::BadCredentials
    ));

    accounts::set_active(&db, user.id, false).await.unwrap();
    assert!(matches!(
        accounts::authenticate(&db, "login_user", TEST_PASSWORD).await.unwrap(),
        LoginOutcome::Inactive
    ));
}

#[actix_rt::test]
#[serial]
async fn test_password_is_hashed() {
    let db = setup_test_database().await.unwrap();
    let user = create_test_teacher(&db, "hashed_user").await.unwrap();

    assert_ne!(user.password, TEST_PASSWORD);
    assert!(user.password.starts_with("$argon2"));
}

#[actix_rt::test]
#[serial]
async fn test_record_login_sets_timestamp() {
    let db = setup_test_database().await.unwrap();
    let user = create_test_student(&db, "stamp_user").await.unwrap();
    assert!(user.last_login.is_none());

    let user = accounts::record_login(&db, user).await.unwrap();
    assert!(user.last_login.is_some());
}

#[actix_rt::test]
#[serial]
async fn test_duplicate_username_and_academic_id() {
    let db = setup_test_database().await.unwrap();
    let mut first = new_user("dup_user", Role::Student);
    first.academic_id = Some("20250001".to_owned());
    accounts::create_user(&db, first).await.unwrap();

    let res = create_test_teacher(&db, "dup_user").await;
    assert!(matches!(res, Err(AcademyError::Duplicate("username"))));

    let mut second = new_user("other_user", Role::Student);
    second.academic_id = Some("20250001".to_owned());
    let res = accounts::create_user(&db, second).await;
    assert!(matches!(res, Err(AcademyError::Duplicate("academic_id"))));
}

#[actix_rt::test]
#[serial]
async fn test_register_student_requires_fields() {
    let db = setup_test_database().await.unwrap();
    let cat = create_test_catalog(&db, None).await.unwrap();

    let mut missing_id = new_user("reg_no_id", Role::Admin);
    missing_id.level = Some(2);
    assert!(matches!(
        accounts::register_student(&db, missing_id).await,
        Err(AcademyError::Invalid(_))
    ));

    let mut new = new_user("reg_ok", Role::Admin);
    new.academic_id = Some("20250042".to_owned());
    new.level = Some(2);
    new.department_id = Some(cat.department.id);
    new.specialization_id = Some(cat.specialization.id);
    let user = accounts::register_student(&db, new).await.unwrap();

    // Self registration never grants another role
    assert_eq!(user.role, Role::Student);
    assert_eq!(user.level, Some(2));
}

#[actix_rt::test]
#[serial]
async fn test_specialization_must_match_department() {
    let db = setup_test_database().await.unwrap();
    let cat = create_test_catalog(&db, None).await.unwrap();
    let other = create_test_department(&db, "Computer Science").await.unwrap();

    let mut new = new_user("misplaced", Role::Student);
    new.department_id = Some(other.id);
    new.specialization_id = Some(cat.specialization.id);
    assert!(matches!(
        accounts::create_user(&db, new).await,
        Err(AcademyError::Invalid(_))
    ));

    let mut orphan = new_user("orphan_spec", Role::Student);
    orphan.academic_id = Some("20250077".to_owned());
    orphan.specialization_id = Some(cat.specialization.id);
    assert!(matches!(
        accounts::register_student(&db, orphan).await,
        Err(AcademyError::Invalid(_))
    ));
    assert!(!accounts::username_taken(&db, "orphan_spec").await.unwrap());
}

#[actix_rt::test]
#[serial]
async fn test_level_dropped_for_staff() {
    let db = setup_test_database().await.unwrap();
    let mut new = new_user("leveled_teacher", Role::Teacher);
    new.level = Some(3);
    let teacher = accounts::create_user(&db, new).await.unwrap();
    assert_eq!(teacher.level, None);

    let mut bad = new_user("bad_level", Role::Student);
    bad.level = Some(7);
    assert!(matches!(
        accounts::create_user(&db, bad).await,
        Err(AcademyError::Invalid(_))
    ));
}

#[actix_rt::test]
#[serial]
async fn test_change_password() {
    let db = setup_test_database().await.unwrap();
    let user = create_test_student(&db, "pw_user").await.unwrap();

    let res = accounts::change_password(&db, user.clone(), "not-it", "new-password-1").await;
    assert!(matches!(res, Err(AcademyError::Invalid(_))));

    accounts::change_password(&db, user, TEST_PASSWORD, "new-password-1")
        .await
        .unwrap();
    assert!(matches!(
        accounts::authenticate(&db, "pw_user", "new-password-1").await.unwrap(),
        LoginOutcome::Success(_)
    ));
    assert!(matches!(
        accounts::authenticate(&db, "pw_user", TEST_PASSWORD).await.unwrap(),
        LoginOutcome::BadCredentials
    ));
}

#[actix_rt::test]
#[serial]
async fn test_delete_user_clears_department_head() {
    let db = setup_test_database().await.unwrap();
    let head = create_test_teacher(&db, "head_teacher").await.unwrap();
    let dep = catalog::create_department(
        &db,
        DepartmentInput {
            name: "Networks".to_owned(),
            description: None,
            head_id: Some(head.id),
        },
    )
    .await
    .unwrap();
    assert_eq!(dep.head_id, Some(head.id));

    accounts::delete_user(&db, head.id).await.unwrap();

    let dep = catalog::find_department(&db, dep.id).await.unwrap();
    assert_eq!(dep.head_id, None);
    assert!(matches!(
        accounts::find_user(&db, head.id).await,
        Err(AcademyError::NotFound(_))
    ));
}

#[actix_rt::test]
#[serial]
async fn test_list_users_filter_and_pages() {
    let db = setup_test_database().await.unwrap();
    for i in 0..5 {
        create_test_student(&db, &format!("page_student_{}", i)).await.unwrap();
    }
    create_test_teacher(&db, "page_teacher").await.unwrap();

    let (rows, pages) = accounts::list_users(
        &db,
        &UserFilter {
            role: Some(Role::Student),
            q: None,
        },
        1,
        2,
    )
    .await
    .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(pages, 3);

    let (rows, _) = accounts::list_users(
        &db,
        &UserFilter {
            role: None,
            q: Some("teacher".to_owned()),
        },
        1,
        10,
    )
    .await
    .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].username, "page_teacher");
}
