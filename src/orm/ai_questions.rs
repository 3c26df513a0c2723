//! SeaORM Entity for ai_questions table

use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::{NotSet, Set};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ai_questions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub lecture_file_id: i32,
    #[sea_orm(column_type = "Text")]
    pub question_text: String,
    /// JSON array of answer choices, in display order.
    #[sea_orm(column_type = "Text")]
    pub options: String,
    pub correct_answer: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub explanation: Option<String>,
    pub generated_by_id: Option<i32>,
    pub generated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::lecture_files::Entity",
        from = "Column::LectureFileId",
        to = "super::lecture_files::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    LectureFile,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::GeneratedById",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "SetNull"
    )]
    GeneratedBy,
}

impl Related<super::lecture_files::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LectureFile.def()
    }
}

impl ActiveModelBehavior for ActiveModel {
    fn before_save(mut self, insert: bool) -> Result<Self, DbErr> {
        if insert {
            if let NotSet = self.generated_at {
                self.generated_at = Set(chrono::Utc::now().naive_utc());
            }
        }
        Ok(self)
    }
}

impl Model {
    /// Decoded answer choices. A malformed column reads as no options.
    pub fn options(&self) -> Vec<String> {
        serde_json::from_str(&self.options).unwrap_or_else(|e| {
            log::warn!("ai_questions {}: bad options column: {}", self.id, e);
            Vec::new()
        })
    }

    pub fn encode_options(options: &[String]) -> String {
        serde_json::to_string(options).unwrap_or_else(|_| "[]".to_owned())
    }
}
