//! Database connection and schema bootstrap.

use crate::orm::{
    ai_questions, ai_summaries, courses, departments, enrollments, lecture_files, notifications,
    role_permissions, specializations, users,
};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait,
    FromQueryResult, QuerySelect, Schema, Select, Statement,
};
use std::collections::HashMap;
use std::time::Duration;

/// Resolves the connection string.
///
/// `DATABASE_URL` wins. Otherwise a postgres URL is assembled from
/// `DB_NAME`, `DB_USER`, `DB_PASSWORD`, `DB_HOST` and `DB_PORT`.
pub fn database_url() -> Option<String> {
    if let Ok(url) = std::env::var("DATABASE_URL") {
        return Some(url);
    }

    let name = std::env::var("DB_NAME").ok()?;
    let user = std::env::var("DB_USER").unwrap_or_else(|_| "postgres".to_owned());
    let password = std::env::var("DB_PASSWORD").unwrap_or_default();
    let host = std::env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_owned());
    let port = std::env::var("DB_PORT").unwrap_or_else(|_| "5432".to_owned());

    Some(format!(
        "postgres://{}:{}@{}:{}/{}",
        user, password, host, port, name
    ))
}

pub async fn connect(url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(url.to_owned());
    opt.connect_timeout(Duration::from_secs(8))
        .sqlx_logging(false);

    // Every connection to `sqlite::memory:` is its own database.
    if url.starts_with("sqlite::memory:") {
        opt.max_connections(1).min_connections(1);
    }

    let db = Database::connect(opt).await?;
    log::info!("Connected to {:?} database", db.get_database_backend());
    Ok(db)
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let mut stmt = Schema::new(backend).create_table_from_entity(entity);
    stmt.if_not_exists();
    db.execute(backend.build(&stmt)).await?;
    Ok(())
}

/// Creates every table and composite index that does not exist yet.
/// Tables are created parents first so foreign keys resolve.
pub async fn create_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    create_table(db, departments::Entity).await?;
    create_table(db, specializations::Entity).await?;
    create_table(db, users::Entity).await?;
    create_table(db, courses::Entity).await?;
    create_table(db, enrollments::Entity).await?;
    create_table(db, lecture_files::Entity).await?;
    create_table(db, notifications::Entity).await?;
    create_table(db, ai_summaries::Entity).await?;
    create_table(db, ai_questions::Entity).await?;
    create_table(db, role_permissions::Entity).await?;

    let backend = db.get_database_backend();
    for sql in [
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_specializations_name_department \
         ON specializations (name, department_id)",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_enrollments_student_course \
         ON enrollments (student_id, course_id)",
        "CREATE INDEX IF NOT EXISTS idx_notifications_recipient \
         ON notifications (recipient_id, is_read)",
        "CREATE INDEX IF NOT EXISTS idx_lecture_files_course \
         ON lecture_files (course_id, uploaded_at)",
    ] {
        db.execute(Statement::from_string(backend, sql.to_owned()))
            .await?;
    }

    log::debug!("Schema is up to date");
    Ok(())
}

#[derive(Debug, FromQueryResult)]
struct GroupCount {
    group_key: i32,
    group_count: i64,
}

/// Runs `aggregate` (e.g. `COUNT(*)`, `COUNT(DISTINCT student_id)`) over
/// `select` grouped by `key`. Keys without rows are absent from the map.
pub async fn count_grouped<E, C>(
    db: &C,
    select: Select<E>,
    key: E::Column,
    aggregate: &str,
) -> Result<HashMap<i32, i64>, DbErr>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    let rows = select
        .select_only()
        .column_as(key, "group_key")
        .column_as(Expr::cust(aggregate), "group_count")
        .group_by(key)
        .into_model::<GroupCount>()
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|r| (r.group_key, r.group_count))
        .collect())
}

/// True when the error comes from a UNIQUE constraint on sqlite or postgres.
pub fn is_unique_violation(err: &DbErr) -> bool {
    let msg = err.to_string();
    msg.contains("UNIQUE constraint failed")
        || msg.contains("duplicate key value violates unique constraint")
}
