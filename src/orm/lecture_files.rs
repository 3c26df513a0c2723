//! SeaORM Entity for lecture_files table

use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::{NotSet, Set};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(10))")]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[sea_orm(string_value = "pdf")]
    Pdf,
    #[sea_orm(string_value = "word")]
    Word,
    #[sea_orm(string_value = "ppt")]
    Ppt,
    #[sea_orm(string_value = "video")]
    Video,
    #[sea_orm(string_value = "audio")]
    Audio,
    #[sea_orm(string_value = "image")]
    Image,
    #[sea_orm(string_value = "other")]
    Other,
}

impl FileType {
    pub const ALL: [FileType; 7] = [
        FileType::Pdf,
        FileType::Word,
        FileType::Ppt,
        FileType::Video,
        FileType::Audio,
        FileType::Image,
        FileType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Word => "word",
            Self::Ppt => "ppt",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Word => "Word",
            Self::Ppt => "PowerPoint",
            Self::Video => "Video",
            Self::Audio => "Audio",
            Self::Image => "Image",
            Self::Other => "Other",
        }
    }

    /// Guess the type from an already validated extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "doc" | "docx" => Self::Word,
            "ppt" | "pptx" => Self::Ppt,
            "mp4" => Self::Video,
            "mp3" => Self::Audio,
            "jpg" | "jpeg" | "png" => Self::Image,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown file type '{}'", s))
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "lecture_files")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    /// Storage key, e.g. `lectures/2025/10/<uuid>_notes.pdf`.
    pub file: String,
    pub file_type: FileType,
    /// Byte size of the stored file. Derived on every save.
    pub file_size: i64,
    pub course_id: i32,
    pub chapter: Option<String>,
    pub uploaded_by_id: Option<i32>,
    pub uploaded_at: DateTime,
    pub download_count: i32,
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::courses::Entity",
        from = "Column::CourseId",
        to = "super::courses::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Course,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UploadedById",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "SetNull"
    )]
    UploadedBy,
    #[sea_orm(has_many = "super::ai_summaries::Entity")]
    AiSummaries,
    #[sea_orm(has_many = "super::ai_questions::Entity")]
    AiQuestions,
}

impl Related<super::courses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Course.def()
    }
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UploadedBy.def()
    }
}

impl Related<super::ai_summaries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AiSummaries.def()
    }
}

impl Related<super::ai_questions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AiQuestions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {
    fn before_save(mut self, insert: bool) -> Result<Self, DbErr> {
        if insert {
            if let NotSet = self.uploaded_at {
                self.uploaded_at = Set(chrono::Utc::now().naive_utc());
            }
            if let NotSet = self.download_count {
                self.download_count = Set(0);
            }
            if let NotSet = self.is_active {
                self.is_active = Set(true);
            }
        }
        Ok(self)
    }
}

impl Model {
    /// File name as shown to users, without the storage prefix.
    pub fn file_name(&self) -> &str {
        let name = self.file.rsplit('/').next().unwrap_or(&self.file);
        // Stored names carry a `<uuid>_` prefix.
        match name.split_once('_') {
            Some((prefix, rest)) if prefix.len() == 32 => rest,
            _ => name,
        }
    }

    pub fn file_size_display(&self) -> String {
        crate::constants::human_size(self.file_size)
    }
}
