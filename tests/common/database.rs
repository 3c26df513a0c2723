//! Test database setup and management
#![allow(dead_code)]

use sacm::permission::RolePermissions;
use sea_orm::{DatabaseConnection, DbErr};
use std::env;

/// Every call yields a fresh, empty schema unless `TEST_DATABASE_URL` points
/// at a shared server, in which case tests must run `#[serial]`.
pub async fn setup_test_database() -> Result<DatabaseConnection, DbErr> {
    let url = env::var("TEST_DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_owned());
    let db = sacm::db::connect(&url).await?;
    sacm::db::create_schema(&db).await?;
    Ok(db)
}

/// Database plus the permission rows the web layer expects.
pub async fn setup_with_permissions() -> Result<(DatabaseConnection, RolePermissions), DbErr> {
    let db = setup_test_database().await?;
    sacm::permission::ensure_role_rows(&db).await?;
    let perms = RolePermissions::load(&db).await?;
    Ok((db, perms))
}
