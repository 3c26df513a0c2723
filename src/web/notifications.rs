use super::{db_err, redirect};
use crate::error::AcademyError;
use crate::flash;
use crate::middleware::csrf::validate_form_token;
use crate::middleware::ClientCtx;
use crate::notifications;
use crate::orm::notifications::Model as Notification;
use actix_web::{get, post, web, Error, HttpResponse};
use askama_actix::{Template, TemplateToResponse};
use sea_orm::DatabaseConnection;
use std::collections::HashMap;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_notifications).service(mark_read);
}

pub struct NotificationItem {
    pub notification: Notification,
    /// Direct recipients may mark the notification read.
    pub can_mark_read: bool,
    pub expired: bool,
}

#[derive(Template)]
#[template(path = "notifications.html")]
pub struct NotificationsTemplate {
    pub client: ClientCtx,
    pub items: Vec<NotificationItem>,
}

#[get("/")]
pub async fn view_notifications(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, Error> {
    let user = client.require_login()?.clone();
    let items = notifications::list_for_user(&db, &user)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(|n| NotificationItem {
            can_mark_read: !n.is_read && n.recipient_id == Some(user.id),
            expired: n.is_expired(),
            notification: n,
        })
        .collect();

    Ok(NotificationsTemplate { client, items }.to_response())
}

#[post("/{id}/read/")]
pub async fn mark_read(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    form: web::Form<HashMap<String, String>>,
) -> Result<HttpResponse, Error> {
    validate_form_token(&cookies, &form)?;
    let user_id = client.require_login()?.id;

    match notifications::mark_read(&db, path.into_inner(), user_id).await {
        Ok(()) => flash::success(&cookies, "Notification marked as read."),
        Err(AcademyError::NotFound(_)) => flash::error(&cookies, "That notification cannot be marked read."),
        Err(e) => return Err(e.into()),
    }
    Ok(redirect("/notifications/"))
}
