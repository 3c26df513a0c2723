//! SeaORM Entity for departments table

use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::{NotSet, Set};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "departments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    /// Head of department. Kept as a plain column: users already reference
    /// departments, and the reverse constraint would make the schema cyclic.
    /// Cleared by `accounts::delete_user`.
    pub head_id: Option<i32>,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::specializations::Entity")]
    Specializations,
    #[sea_orm(has_many = "super::users::Entity")]
    Users,
}

impl Related<super::specializations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Specializations.def()
    }
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {
    fn before_save(mut self, insert: bool) -> Result<Self, DbErr> {
        if insert {
            if let NotSet = self.created_at {
                self.created_at = Set(chrono::Utc::now().naive_utc());
            }
        }
        Ok(self)
    }
}
