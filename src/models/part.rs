// src/models/part.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Node type within the content tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PartType {
    Module,
    Tutorial,
    Exercise,
    Page,
    Task,
}

impl PartType {
    /// Whether a part of this type may be placed under a parent of `parent` type.
    /// `None` means "no parent"; only modules live at the root.
    pub fn allowed_under(self, parent: Option<PartType>) -> bool {
        matches!(
            (self, parent),
            (PartType::Module, None)
                | (PartType::Tutorial, Some(PartType::Module))
                | (PartType::Exercise, Some(PartType::Module))
                | (PartType::Page, Some(PartType::Tutorial))
                | (PartType::Task, Some(PartType::Exercise))
        )
    }

    /// Pages are tracked on their parent, modules are not tracked at all.
    pub fn tracks_progress(self) -> bool {
        matches!(self, PartType::Tutorial | PartType::Exercise | PartType::Task)
    }
}

/// Publication status of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PartStatus {
    Unavailable,
    Available,
    Archived,
}

impl PartStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unavailable" => Some(PartStatus::Unavailable),
            "available" => Some(PartStatus::Available),
            "archived" => Some(PartStatus::Archived),
            _ => None,
        }
    }

    /// Only modules can be archived.
    pub fn valid_for(self, part_type: PartType) -> bool {
        self != PartStatus::Archived || part_type == PartType::Module
    }
}

/// Represents the 'parts' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Part {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub part_type: PartType,
    pub status: PartStatus,
    pub title: String,
    pub position: i64,

    /// Sanitized HTML, including any embedded quiz markup.
    pub content: String,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Short listing form used for children.
#[derive(Debug, Serialize, FromRow)]
pub struct PartSummary {
    pub id: i64,
    pub part_type: PartType,
    pub status: PartStatus,
    pub title: String,
    pub position: i64,
}

/// A part above another one in the tree, as far as access checks need it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct Ancestor {
    pub id: i64,
    pub part_type: PartType,
    pub status: PartStatus,
}

/// DTO for creating a new part.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePartRequest {
    pub parent_id: Option<i64>,
    pub part_type: PartType,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(max = 200000))]
    pub content: Option<String>,
    pub position: Option<i64>,
}

/// DTO for editing a part. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePartRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(length(max = 200000))]
    pub content: Option<String>,
    pub position: Option<i64>,
}

/// DTO for changing the status directly.
#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: PartStatus,
}
