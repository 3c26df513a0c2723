//! SeaORM Entity for courses table

use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::{NotSet, Set};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(10))")]
#[serde(rename_all = "lowercase")]
pub enum Semester {
    #[sea_orm(string_value = "first")]
    First,
    #[sea_orm(string_value = "second")]
    Second,
    #[sea_orm(string_value = "summer")]
    Summer,
}

impl Semester {
    pub const ALL: [Semester; 3] = [Semester::First, Semester::Second, Semester::Summer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Second => "second",
            Self::Summer => "summer",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::First => "First semester",
            Self::Second => "Second semester",
            Self::Summer => "Summer semester",
        }
    }
}

impl Default for Semester {
    fn default() -> Self {
        Self::First
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Semester {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Self::First),
            "second" => Ok(Self::Second),
            "summer" => Ok(Self::Summer),
            other => Err(format!("unknown semester '{}'", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "courses")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    #[sea_orm(unique)]
    pub code: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub specialization_id: i32,
    pub level: i32,
    pub semester: Semester,
    pub academic_year: String,
    pub credit_hours: i32,
    pub teacher_id: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::specializations::Entity",
        from = "Column::SpecializationId",
        to = "super::specializations::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Specialization,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::TeacherId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "SetNull"
    )]
    Teacher,
    #[sea_orm(has_many = "super::enrollments::Entity")]
    Enrollments,
    #[sea_orm(has_many = "super::lecture_files::Entity")]
    LectureFiles,
    #[sea_orm(has_many = "super::notifications::Entity")]
    Notifications,
}

impl Related<super::specializations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Specialization.def()
    }
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Teacher.def()
    }
}

impl Related<super::enrollments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Enrollments.def()
    }
}

impl Related<super::lecture_files::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LectureFiles.def()
    }
}

impl Related<super::notifications::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Notifications.def()
    }
}

impl ActiveModelBehavior for ActiveModel {
    fn before_save(mut self, insert: bool) -> Result<Self, DbErr> {
        let now = chrono::Utc::now().naive_utc();
        if insert {
            if let NotSet = self.created_at {
                self.created_at = Set(now);
            }
        }
        self.updated_at = Set(now);
        Ok(self)
    }
}

impl Model {
    pub fn level_label(&self) -> &'static str {
        crate::constants::level_label(Some(self.level))
    }

    /// Number of enrollment rows for this course, active or not.
    pub async fn enrolled_students_count(
        &self,
        db: &sea_orm::DatabaseConnection,
    ) -> Result<u64, DbErr> {
        use sea_orm::{PaginatorTrait, QueryFilter};

        let count = super::enrollments::Entity::find()
            .filter(super::enrollments::Column::CourseId.eq(self.id))
            .count(db)
            .await?;
        Ok(count as u64)
    }
}
