// src/models/progress.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use validator::Validate;

use crate::models::file::{FileSummary, WorkspaceFile};

/// Time spent on one page, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageVisit {
    pub duration: i64,
}

/// Visited pages keyed by page id.
pub type Visited = BTreeMap<String, PageVisit>;

/// Represents the 'user_part_progress' table.
/// One row per (user, owning part).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserPartProgress {
    pub id: i64,
    pub user_id: i64,
    pub part_id: i64,

    /// The page currently open, for parts made of pages.
    pub current_id: Option<i64>,

    pub visited: Json<Visited>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// A progress row together with its workspace files, ordered by position.
#[derive(Debug, Clone)]
pub struct PartProgress {
    pub progress: UserPartProgress,
    pub files: Vec<WorkspaceFile>,
}

impl PartProgress {
    pub fn file(&self, filename: &str, mimetype: &str) -> Option<&WorkspaceFile> {
        self.files
            .iter()
            .find(|f| f.filename == filename && f.mimetype == mimetype)
    }
}

/// DTO returned to the client.
#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub id: i64,
    pub part_id: i64,
    pub current_id: Option<i64>,
    pub visited: Visited,
    pub files: Vec<FileSummary>,
}

impl From<&PartProgress> for ProgressResponse {
    fn from(value: &PartProgress) -> Self {
        Self {
            id: value.progress.id,
            part_id: value.progress.part_id,
            current_id: value.progress.current_id,
            visited: value.progress.visited.0.clone(),
            files: value.files.iter().map(FileSummary::from).collect(),
        }
    }
}

/// DTO for reporting time spent on a page, in milliseconds.
#[derive(Debug, Deserialize, Validate)]
pub struct RecordDurationRequest {
    #[validate(range(min = 0, max = 86400000))]
    pub duration: i64,
}
