//! SeaORM entities. Declared leaf-first.

pub mod ai_questions;
pub mod ai_summaries;
pub mod courses;
pub mod departments;
pub mod enrollments;
pub mod lecture_files;
pub mod notifications;
pub mod role_permissions;
pub mod specializations;
pub mod users;
