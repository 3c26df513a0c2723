//! Administration pages. Mounted under `/admin` behind `RoleGuard::admin_only`.

pub mod courses;
pub mod departments;
pub mod enrollments;
pub mod notifications;
pub mod permissions;
pub mod specializations;
pub mod users;

use super::db_err;
use crate::dashboard::{self, AdminStats};
use crate::middleware::ClientCtx;
use actix_web::{get, web, Error, HttpResponse};
use askama_actix::{Template, TemplateToResponse};
use sea_orm::DatabaseConnection;

pub(super) fn configure(conf: &mut web::ServiceConfig) {
    conf.service(view_admin_index);
    departments::configure(conf);
    specializations::configure(conf);
    courses::configure(conf);
    enrollments::configure(conf);
    users::configure(conf);
    notifications::configure(conf);
    permissions::configure(conf);
}

#[derive(Template)]
#[template(path = "admin/index.html")]
pub struct AdminIndexTemplate {
    pub client: ClientCtx,
    pub stats: AdminStats,
}

#[get("/")]
pub async fn view_admin_index(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, Error> {
    let stats = dashboard::admin_stats(&db).await.map_err(db_err)?;
    Ok(AdminIndexTemplate { client, stats }.to_response())
}
