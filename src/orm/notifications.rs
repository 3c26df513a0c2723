//! SeaORM Entity for notifications table
//!
//! A notification is addressed to a course (broadcast to its enrollees), to a
//! single recipient, or to neither (general).

use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::{NotSet, Set};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(15))")]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    #[sea_orm(string_value = "general")]
    General,
    #[sea_orm(string_value = "course")]
    Course,
    #[sea_orm(string_value = "file")]
    File,
    #[sea_orm(string_value = "exam")]
    Exam,
    #[sea_orm(string_value = "announcement")]
    Announcement,
}

impl NotificationType {
    pub const ALL: [NotificationType; 5] = [
        NotificationType::General,
        NotificationType::Course,
        NotificationType::File,
        NotificationType::Exam,
        NotificationType::Announcement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Course => "course",
            Self::File => "file",
            Self::Exam => "exam",
            Self::Announcement => "announcement",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::General => "General",
            Self::Course => "Course",
            Self::File => "New file",
            Self::Exam => "Exam",
            Self::Announcement => "Announcement",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown notification type '{}'", s))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(10))")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[sea_orm(string_value = "low")]
    Low,
    #[sea_orm(string_value = "normal")]
    Normal,
    #[sea_orm(string_value = "high")]
    High,
    #[sea_orm(string_value = "urgent")]
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Urgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Normal => "Normal",
            Self::High => "High",
            Self::Urgent => "Urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown priority '{}'", s))
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    pub notification_type: NotificationType,
    pub priority: Priority,
    pub sender_id: Option<i32>,
    pub course_id: Option<i32>,
    pub recipient_id: Option<i32>,
    pub is_read: bool,
    pub created_at: DateTime,
    pub expiry_date: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::SenderId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "SetNull"
    )]
    Sender,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::RecipientId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Recipient,
    #[sea_orm(
        belongs_to = "super::courses::Entity",
        from = "Column::CourseId",
        to = "super::courses::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Course,
}

impl Related<super::courses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Course.def()
    }
}

impl ActiveModelBehavior for ActiveModel {
    fn before_save(mut self, insert: bool) -> Result<Self, DbErr> {
        if insert {
            if let NotSet = self.created_at {
                self.created_at = Set(chrono::Utc::now().naive_utc());
            }
            if let NotSet = self.is_read {
                self.is_read = Set(false);
            }
        }
        Ok(self)
    }
}

impl Model {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().naive_utc())
    }

    pub fn is_expired_at(&self, now: DateTime) -> bool {
        match self.expiry_date {
            Some(expiry) => now > expiry,
            None => false,
        }
    }

    pub fn is_general(&self) -> bool {
        self.course_id.is_none() && self.recipient_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(expiry_date: Option<DateTime>) -> Model {
        Model {
            id: 1,
            title: "Exam moved".to_owned(),
            content: "Room 4".to_owned(),
            notification_type: NotificationType::Exam,
            priority: Priority::High,
            sender_id: None,
            course_id: None,
            recipient_id: None,
            is_read: false,
            created_at: chrono::Utc::now().naive_utc(),
            expiry_date,
        }
    }

    #[test]
    fn test_notification_without_expiry_never_expires() {
        assert!(!notification(None).is_expired());
    }

    #[test]
    fn test_notification_expiry() {
        let now = chrono::Utc::now().naive_utc();
        let n = notification(Some(now - chrono::Duration::hours(1)));
        assert!(n.is_expired_at(now));
        let n = notification(Some(now + chrono::Duration::hours(1)));
        assert!(!n.is_expired_at(now));
    }

    #[test]
    fn test_unaddressed_notification_is_general() {
        assert!(notification(None).is_general());
    }
}
