pub mod admin;
pub mod ai;
pub mod api;
pub mod courses;
pub mod dashboard;
pub mod error;
pub mod files;
pub mod index;
pub mod login;
pub mod logout;
pub mod notifications;
pub mod profile;
pub mod register;

use crate::middleware::RoleGuard;
use actix_web::{error as aerror, http::header, web, Error, HttpResponse};

/// Configures the web app by adding services from each web file.
///
/// Guarded areas are scopes wrapped in a `RoleGuard`, which needs
/// `ClientCtx` to run before it.
pub fn configure(conf: &mut web::ServiceConfig) {
    // Descending order. Order is important.
    // Route resolution will stop at the first match.
    index::configure(conf);
    login::configure(conf);
    logout::configure(conf);
    register::configure(conf);
    api::configure(conf);

    conf.service(
        web::scope("/admin")
            .wrap(RoleGuard::admin_only())
            .configure(admin::configure),
    )
    .service(
        web::scope("/dashboard")
            .wrap(RoleGuard::authenticated())
            .configure(dashboard::configure),
    )
    .service(
        web::scope("/profile")
            .wrap(RoleGuard::authenticated())
            .configure(profile::configure),
    )
    .service(
        web::scope("/notifications")
            .wrap(RoleGuard::authenticated())
            .configure(notifications::configure),
    )
    .service(
        web::scope("/courses")
            .wrap(RoleGuard::authenticated())
            .configure(courses::configure),
    )
    .service(
        web::scope("/files")
            .wrap(RoleGuard::authenticated())
            .configure(files::configure)
            .configure(ai::configure),
    );
}

/// 303 to `location`, the answer to every successful form POST.
pub fn redirect(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, location))
        .finish()
}

/// Logs a database failure and hides it behind a 500.
pub fn db_err(e: sea_orm::DbErr) -> Error {
    log::error!("Database error: {}", e);
    aerror::ErrorInternalServerError("Database error")
}
