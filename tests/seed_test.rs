/// Integration tests for initial data and the role permission matrix
mod common;
use serial_test::serial;

use common::database::*;
use sacm::orm::users::Role;
use sacm::orm::{departments, role_permissions, specializations};
use sacm::permission::{self, Capabilities, RolePermissions};
use sacm::seed::{self, SEED_DEPARTMENTS, SEED_IT_SPECIALIZATIONS};
use sacm::AcademyError;
use sea_orm::EntityTrait;

#[actix_rt::test]
#[serial]
async fn test_seed_is_idempotent() {
    let db = setup_test_database().await.unwrap();

    let first = seed::seed_initial_data(&db).await.unwrap();
    assert_eq!(first.departments.len(), SEED_DEPARTMENTS.len());
    assert_eq!(first.specializations.len(), SEED_IT_SPECIALIZATIONS.len());
    assert_eq!(first.roles.len(), Role::ALL.len());

    let second = seed::seed_initial_data(&db).await.unwrap();
    assert!(second.departments.is_empty());
    assert!(second.specializations.is_empty());
    assert!(second.roles.is_empty());

    assert_eq!(
        departments::Entity::find().all(&db).await.unwrap().len(),
        SEED_DEPARTMENTS.len()
    );
    assert_eq!(
        specializations::Entity::find().all(&db).await.unwrap().len(),
        SEED_IT_SPECIALIZATIONS.len()
    );
    assert_eq!(
        role_permissions::Entity::find().all(&db).await.unwrap().len(),
        Role::ALL.len()
    );
}

#[actix_rt::test]
#[serial]
async fn test_create_admin() {
    let db = setup_test_database().await.unwrap();

    assert!(matches!(
        seed::create_admin(&db, "root", "short").await,
        Err(AcademyError::Invalid(_))
    ));

    let admin = seed::create_admin(&db, "root", "a-long-password")
        .await
        .unwrap()
        .expect("First call should create the account");
    assert_eq!(admin.role, Role::Admin);

    assert!(seed::create_admin(&db, "root", "a-long-password")
        .await
        .unwrap()
        .is_none());
}

#[actix_rt::test]
#[serial]
async fn test_update_role_reloads_cache() {
    let (db, perms) = setup_with_permissions().await.unwrap();
    assert!(!perms.can(Role::Student, Capabilities::UPLOAD_FILES));

    permission::update_role(
        &db,
        &perms,
        Role::Student,
        Capabilities::USE_AI | Capabilities::UPLOAD_FILES,
    )
    .await
    .unwrap();
    assert!(perms.can(Role::Student, Capabilities::UPLOAD_FILES));

    // A fresh load sees the stored row
    let reloaded = RolePermissions::load(&db).await.unwrap();
    assert_eq!(
        reloaded.get(Role::Student),
        Capabilities::USE_AI | Capabilities::UPLOAD_FILES
    );

    permission::update_role(&db, &perms, Role::Teacher, Capabilities::empty())
        .await
        .unwrap();
    assert!(!perms.can(Role::Teacher, Capabilities::SEND_NOTIFICATIONS));
    assert_eq!(perms.get(Role::Admin), Capabilities::all());
}
