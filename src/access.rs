//! Per-course visibility rules shared by the course, file and AI pages.

use crate::enrollment::is_actively_enrolled;
use crate::orm::courses;
use crate::orm::users::{self, Role};
use sea_orm::{DatabaseConnection, DbErr};

/// Admins and the assigned teacher manage a course.
pub fn can_manage_course(user: &users::Model, course: &courses::Model) -> bool {
    match user.role {
        Role::Admin => true,
        Role::Teacher => course.teacher_id == Some(user.id),
        Role::Student => false,
    }
}

/// Managers see a course; students only while actively enrolled in it.
pub async fn can_view_course(
    db: &DatabaseConnection,
    user: &users::Model,
    course: &courses::Model,
) -> Result<bool, DbErr> {
    if can_manage_course(user, course) {
        return Ok(true);
    }
    match user.role {
        Role::Student => is_actively_enrolled(db, user.id, course.id).await,
        _ => Ok(false),
    }
}
