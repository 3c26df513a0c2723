use crate::accounts;
use crate::catalog;
use crate::flash;
use crate::forms::{id_options, parse_datetime_local, parse_id, str_options, FormErrors, SelectOption};
use crate::middleware::csrf::{validate_csrf_token, validate_form_token};
use crate::middleware::ClientCtx;
use crate::notifications::{self, NewNotification, NotificationRow};
use crate::orm::notifications::{NotificationType, Priority};
use crate::permission::Capabilities;
use crate::web::{db_err, redirect};
use actix_web::{get, post, web, Error, HttpResponse};
use askama_actix::{Template, TemplateToResponse};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;

pub(super) fn configure(conf: &mut web::ServiceConfig) {
    conf.service(view_notifications)
        .service(view_new_notification)
        .service(post_new_notification)
        .service(post_delete_notification);
}

const AUDIENCES: [(&str, &str); 3] = [
    ("general", "Everyone (general)"),
    ("course", "A course"),
    ("user", "A single user"),
];

#[derive(Template)]
#[template(path = "admin/notifications.html")]
pub struct NotificationsTemplate {
    pub client: ClientCtx,
    pub rows: Vec<NotificationRow>,
}

#[derive(Template)]
#[template(path = "admin/notification_form.html")]
pub struct NotificationFormTemplate {
    pub client: ClientCtx,
    pub form: NotificationForm,
    pub audiences: Vec<SelectOption>,
    pub courses: Vec<SelectOption>,
    pub users: Vec<SelectOption>,
    pub types: Vec<SelectOption>,
    pub priorities: Vec<SelectOption>,
    pub errors: FormErrors,
}

#[derive(Default, Deserialize)]
pub struct NotificationForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub notification_type: String,
    #[serde(default)]
    pub priority: String,
    /// One of `general`, `course`, `user`.
    #[serde(default)]
    pub audience: String,
    #[serde(default)]
    pub course: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub csrf_token: String,
}

impl NotificationForm {
    fn to_new(&self, sender_id: Option<i32>, errors: &mut FormErrors) -> NewNotification {
        if self.title.trim().is_empty() {
            errors.add("title", "This field is required.");
        }
        if self.content.trim().is_empty() {
            errors.add("content", "This field is required.");
        }

        let (course_id, recipient_id) = match self.audience.as_str() {
            "course" => {
                let id = parse_id(self.course.as_deref());
                if id.is_none() {
                    errors.add("course", "Choose a course.");
                }
                (id, None)
            }
            "user" => {
                let id = parse_id(self.recipient.as_deref());
                if id.is_none() {
                    errors.add("recipient", "Choose a user.");
                }
                (None, id)
            }
            _ => (None, None),
        };

        let expiry_date = match self.expiry_date.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => {
                let parsed = parse_datetime_local(Some(v));
                if parsed.is_none() {
                    errors.add("expiry_date", "Enter a valid date and time.");
                }
                parsed
            }
            _ => None,
        };

        NewNotification {
            title: self.title.clone(),
            content: self.content.clone(),
            notification_type: NotificationType::from_str(&self.notification_type)
                .unwrap_or(NotificationType::General),
            priority: Priority::from_str(&self.priority).unwrap_or(Priority::Normal),
            sender_id,
            course_id,
            recipient_id,
            expiry_date,
        }
    }
}

async fn render_form(
    client: ClientCtx,
    db: &DatabaseConnection,
    form: NotificationForm,
    errors: FormErrors,
) -> Result<HttpResponse, Error> {
    let courses = catalog::all_courses(db).await.map_err(db_err)?;
    let users = accounts::active_users(db).await.map_err(db_err)?;

    let audience = if form.audience.is_empty() { "general" } else { form.audience.as_str() };
    let type_value = if form.notification_type.is_empty() {
        NotificationType::General.as_str()
    } else {
        form.notification_type.as_str()
    };
    let priority_value = if form.priority.is_empty() {
        Priority::Normal.as_str()
    } else {
        form.priority.as_str()
    };

    Ok(NotificationFormTemplate {
        audiences: str_options(AUDIENCES, audience),
        courses: id_options(
            courses
                .into_iter()
                .map(|c| (c.id, format!("{} {}", c.code, c.name))),
            parse_id(form.course.as_deref()),
        ),
        users: id_options(
            users
                .into_iter()
                .map(|u| (u.id, format!("{} ({})", u.full_name(), u.username))),
            parse_id(form.recipient.as_deref()),
        ),
        types: str_options(
            NotificationType::ALL.iter().map(|t| (t.as_str(), t.label())),
            type_value,
        ),
        priorities: str_options(
            Priority::ALL.iter().map(|p| (p.as_str(), p.label())),
            priority_value,
        ),
        client,
        form,
        errors,
    }
    .to_response())
}

#[get("/notifications/")]
pub async fn view_notifications(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, Error> {
    let rows = notifications::list_all(&db).await.map_err(db_err)?;
    Ok(NotificationsTemplate { client, rows }.to_response())
}

#[get("/notifications/new/")]
pub async fn view_new_notification(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, Error> {
    client.require_capability(Capabilities::SEND_NOTIFICATIONS)?;
    render_form(client, &db, NotificationForm::default(), FormErrors::new()).await
}

#[post("/notifications/new/")]
pub async fn post_new_notification(
    client: ClientCtx,
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    form: web::Form<NotificationForm>,
) -> Result<HttpResponse, Error> {
    validate_csrf_token(&cookies, &form.csrf_token)?;
    client.require_capability(Capabilities::SEND_NOTIFICATIONS)?;
    let form = form.into_inner();

    let mut errors = FormErrors::new();
    let new = form.to_new(client.get_id(), &mut errors);
    if errors.is_empty() {
        match notifications::send(&db, new).await {
            Ok(_) => {
                flash::success(&cookies, "The notification has been sent.");
                return Ok(redirect("/admin/notifications/"));
            }
            Err(e) => errors.absorb(e)?,
        }
    }
    render_form(client, &db, form, errors).await
}

#[post("/notifications/{id}/delete/")]
pub async fn post_delete_notification(
    cookies: actix_session::Session,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    form: web::Form<HashMap<String, String>>,
) -> Result<HttpResponse, Error> {
    validate_form_token(&cookies, &form)?;
    notifications::delete_notification(&db, path.into_inner()).await?;
    flash::success(&cookies, "Notification deleted.");
    Ok(redirect("/admin/notifications/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audience_selects_target() {
        let form = NotificationForm {
            title: "Exam".to_owned(),
            content: "Room 4".to_owned(),
            audience: "course".to_owned(),
            course: Some("7".to_owned()),
            recipient: Some("9".to_owned()),
            ..Default::default()
        };
        let mut errors = FormErrors::new();
        let new = form.to_new(Some(1), &mut errors);
        assert!(errors.is_empty());
        assert_eq!(new.course_id, Some(7));
        assert_eq!(new.recipient_id, None);

        let general = NotificationForm {
            audience: "general".to_owned(),
            ..form
        };
        let new = general.to_new(Some(1), &mut errors);
        assert_eq!((new.course_id, new.recipient_id), (None, None));
        assert_eq!(new.notification_type, NotificationType::General);
    }

    #[test]
    fn test_user_audience_needs_recipient() {
        let form = NotificationForm {
            title: "Hi".to_owned(),
            content: "Hello".to_owned(),
            audience: "user".to_owned(),
            expiry_date: Some("tomorrow".to_owned()),
            ..Default::default()
        };
        let mut errors = FormErrors::new();
        form.to_new(None, &mut errors);
        assert!(errors.has("recipient"));
        assert!(errors.has("expiry_date"));
    }
}
