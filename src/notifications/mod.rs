//! Course broadcasts, direct messages and general announcements.
//!
//! A notification reaches a user when it is addressed to them directly, or
//! when it is broadcast to a course the user is actively enrolled in.
//! General notifications (no course, no recipient) never show up in a
//! targeted query.

use crate::enrollment::active_course_ids;
use crate::error::AcademyError;
use crate::orm::notifications::{self, NotificationType, Priority};
use crate::orm::users::{self, Role};
use crate::orm::courses;
use chrono::NaiveDateTime;
use sea_orm::{entity::*, query::*, sea_query::Expr, Condition, DatabaseConnection, DbErr, Select};

pub struct NewNotification {
    pub title: String,
    pub content: String,
    pub notification_type: NotificationType,
    pub priority: Priority,
    pub sender_id: Option<i32>,
    pub course_id: Option<i32>,
    pub recipient_id: Option<i32>,
    pub expiry_date: Option<NaiveDateTime>,
}

impl NewNotification {
    pub fn new(title: &str, content: &str) -> Self {
        Self {
            title: title.to_owned(),
            content: content.to_owned(),
            notification_type: NotificationType::General,
            priority: Priority::Normal,
            sender_id: None,
            course_id: None,
            recipient_id: None,
            expiry_date: None,
        }
    }
}

/// Stores a notification after checking its addressing.
pub async fn send(
    db: &DatabaseConnection,
    new: NewNotification,
) -> Result<notifications::Model, AcademyError> {
    if new.title.trim().is_empty() || new.content.trim().is_empty() {
        return Err(AcademyError::invalid("A notification needs a title and content."));
    }
    if new.course_id.is_some() && new.recipient_id.is_some() {
        return Err(AcademyError::invalid(
            "A notification goes either to a course or to a single user, not both.",
        ));
    }
    if let Some(course_id) = new.course_id {
        courses::Entity::find_by_id(course_id)
            .one(db)
            .await?
            .ok_or(AcademyError::NotFound("Course"))?;
    }
    if let Some(recipient_id) = new.recipient_id {
        users::Entity::find_by_id(recipient_id)
            .one(db)
            .await?
            .ok_or(AcademyError::NotFound("Recipient"))?;
    }

    let model = notifications::ActiveModel {
        title: Set(new.title.trim().to_owned()),
        content: Set(new.content),
        notification_type: Set(new.notification_type),
        priority: Set(new.priority),
        sender_id: Set(new.sender_id),
        course_id: Set(new.course_id),
        recipient_id: Set(new.recipient_id),
        expiry_date: Set(new.expiry_date),
        ..Default::default()
    }
    .insert(db)
    .await?;

    log::info!(
        "Notification {} sent by {:?} (course {:?}, recipient {:?})",
        model.id,
        model.sender_id,
        model.course_id,
        model.recipient_id
    );
    Ok(model)
}

/// Direct messages, plus broadcasts to courses a student attends.
async fn audience(db: &DatabaseConnection, user: &users::Model) -> Result<Condition, DbErr> {
    let mut cond = Condition::any().add(notifications::Column::RecipientId.eq(user.id));
    if user.role == Role::Student {
        let course_ids = active_course_ids(db, user.id).await?;
        if !course_ids.is_empty() {
            cond = cond.add(notifications::Column::CourseId.is_in(course_ids));
        }
    }
    Ok(cond)
}

fn not_expired(now: NaiveDateTime) -> Condition {
    Condition::any()
        .add(notifications::Column::ExpiryDate.is_null())
        .add(notifications::Column::ExpiryDate.gt(now))
}

/// The audience is an OR group, so every clause is nested under one AND.
fn unread_query(audience: Condition) -> Select<notifications::Entity> {
    notifications::Entity::find().filter(
        Condition::all()
            .add(audience)
            .add(notifications::Column::IsRead.eq(false))
            .add(not_expired(chrono::Utc::now().naive_utc())),
    )
}

/// Newest unread, unexpired notifications for the user, and their total.
pub async fn unread_for_user(
    db: &DatabaseConnection,
    user: &users::Model,
    limit: u64,
) -> Result<(Vec<notifications::Model>, u64), DbErr> {
    let audience = audience(db, user).await?;
    let total = unread_query(audience.clone()).count(db).await? as u64;
    let items = unread_query(audience)
        .order_by_desc(notifications::Column::CreatedAt)
        .order_by_desc(notifications::Column::Id)
        .limit(limit)
        .all(db)
        .await?;
    Ok((items, total))
}

/// Badge count shown in the page header.
pub async fn count_unread_for_user(db: &DatabaseConnection, user: &users::Model) -> Result<u64, DbErr> {
    let audience = audience(db, user).await?;
    Ok(unread_query(audience).count(db).await? as u64)
}

/// Everything addressed to the user, read or not, newest first.
pub async fn list_for_user(
    db: &DatabaseConnection,
    user: &users::Model,
) -> Result<Vec<notifications::Model>, DbErr> {
    let audience = audience(db, user).await?;
    notifications::Entity::find()
        .filter(Condition::all().add(audience))
        .order_by_desc(notifications::Column::CreatedAt)
        .order_by_desc(notifications::Column::Id)
        .all(db)
        .await
}

/// Only the direct recipient may mark a notification read.
pub async fn mark_read(
    db: &DatabaseConnection,
    id: i32,
    user_id: i32,
) -> Result<(), AcademyError> {
    let res = notifications::Entity::update_many()
        .col_expr(notifications::Column::IsRead, Expr::value(true))
        .filter(notifications::Column::Id.eq(id))
        .filter(notifications::Column::RecipientId.eq(user_id))
        .exec(db)
        .await?;

    if res.rows_affected == 0 {
        return Err(AcademyError::NotFound("Notification"));
    }
    Ok(())
}

pub struct NotificationRow {
    pub notification: notifications::Model,
    pub course: Option<courses::Model>,
}

impl NotificationRow {
    /// Who the notification is for, as shown in listings.
    pub fn audience(&self) -> String {
        match (&self.course, self.notification.recipient_id) {
            (Some(course), _) => format!("Course {}", course.code),
            (None, Some(id)) => format!("User #{}", id),
            (None, None) => "Everyone".to_owned(),
        }
    }
}

/// Admin listing with the broadcast course, newest first.
pub async fn list_all(db: &DatabaseConnection) -> Result<Vec<NotificationRow>, DbErr> {
    Ok(notifications::Entity::find()
        .find_also_related(courses::Entity)
        .order_by_desc(notifications::Column::CreatedAt)
        .order_by_desc(notifications::Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(|(notification, course)| NotificationRow {
            notification,
            course,
        })
        .collect())
}

pub async fn delete_notification(db: &DatabaseConnection, id: i32) -> Result<(), AcademyError> {
    let res = notifications::Entity::delete_many()
        .filter(notifications::Column::Id.eq(id))
        .exec(db)
        .await?;
    if res.rows_affected == 0 {
        return Err(AcademyError::NotFound("Notification"));
    }
    Ok(())
}
