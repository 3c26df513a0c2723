//! JSON endpoints used by form scripts.

use super::db_err;
use crate::catalog::{self, SpecializationOption};
use actix_web::{get, web, Error, HttpResponse};
use sea_orm::DatabaseConnection;
use serde::Deserialize;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(get_specializations);
}

#[derive(Deserialize)]
pub struct SpecializationQuery {
    /// Kept as text so a malformed value yields `[]` rather than 400.
    department_id: Option<String>,
}

/// `GET /api/specializations/?department_id=<id>` -> `[{"id", "name"}]`
#[get("/api/specializations/")]
pub async fn get_specializations(
    db: web::Data<DatabaseConnection>,
    query: web::Query<SpecializationQuery>,
) -> Result<HttpResponse, Error> {
    let department_id = query
        .department_id
        .as_deref()
        .and_then(|v| v.trim().parse::<i32>().ok());

    let items: Vec<SpecializationOption> = match department_id {
        Some(id) => catalog::specializations_for_department(&db, id)
            .await
            .map_err(db_err)?,
        None => Vec::new(),
    };

    Ok(HttpResponse::Ok().json(items))
}
