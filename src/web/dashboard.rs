use super::db_err;
use crate::dashboard::{self, AdminDashboard, Dashboard, StudentDashboard, TeacherDashboard};
use crate::middleware::ClientCtx;
use actix_web::{get, web, Error, HttpResponse};
use askama_actix::{Template, TemplateToResponse};
use sea_orm::DatabaseConnection;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_dashboard);
}

#[derive(Template)]
#[template(path = "dashboard/student.html")]
pub struct StudentDashboardTemplate {
    pub client: ClientCtx,
    pub dash: StudentDashboard,
}

#[derive(Template)]
#[template(path = "dashboard/teacher.html")]
pub struct TeacherDashboardTemplate {
    pub client: ClientCtx,
    pub dash: TeacherDashboard,
}

#[derive(Template)]
#[template(path = "dashboard/admin.html")]
pub struct AdminDashboardTemplate {
    pub client: ClientCtx,
    pub dash: AdminDashboard,
}

#[get("/")]
pub async fn view_dashboard(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, Error> {
    let user = client.require_login()?.clone();
    let recent = crate::app_config::limits().dashboard_recent;

    Ok(match dashboard::build(&db, &user, recent).await.map_err(db_err)? {
        Dashboard::Student(dash) => StudentDashboardTemplate { client, dash }.to_response(),
        Dashboard::Teacher(dash) => TeacherDashboardTemplate { client, dash }.to_response(),
        Dashboard::Admin(dash) => AdminDashboardTemplate { client, dash }.to_response(),
    })
}
