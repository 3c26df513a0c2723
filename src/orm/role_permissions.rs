//! SeaORM Entity for role_permissions table

use super::users::Role;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "role_permissions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub role: Role,
    pub can_upload_files: bool,
    pub can_delete_files: bool,
    pub can_manage_users: bool,
    pub can_manage_courses: bool,
    pub can_send_notifications: bool,
    pub can_view_reports: bool,
    pub can_use_ai: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
