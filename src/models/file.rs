// src/models/file.rs

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

static FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\- ]{0,254}$").expect("valid regex"));

static MIMETYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9!#$&^_.+\-]*/[a-z0-9][a-z0-9!#$&^_.+\-]*$").expect("valid regex")
});

/// Represents the 'template_files' table.
/// Template data is copied into each learner's workspace, never referenced.
#[derive(Debug, Clone, FromRow)]
pub struct TemplateFile {
    pub id: i64,
    pub part_id: i64,
    pub filename: String,
    pub mimetype: String,
    pub position: i64,
    pub data: Vec<u8>,
}

/// Represents the 'workspace_files' table: one learner's mutable copy.
#[derive(Debug, Clone, FromRow)]
pub struct WorkspaceFile {
    pub id: i64,
    pub progress_id: i64,
    pub filename: String,
    pub mimetype: String,
    pub position: i64,
    pub data: Vec<u8>,
}

/// File metadata without its content, used in listings.
#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct FileSummary {
    pub id: i64,
    pub filename: String,
    pub mimetype: String,
    pub position: i64,
    pub size: i64,
}

impl From<&TemplateFile> for FileSummary {
    fn from(file: &TemplateFile) -> Self {
        Self {
            id: file.id,
            filename: file.filename.clone(),
            mimetype: file.mimetype.clone(),
            position: file.position,
            size: file.data.len() as i64,
        }
    }
}

impl From<&WorkspaceFile> for FileSummary {
    fn from(file: &WorkspaceFile) -> Self {
        Self {
            id: file.id,
            filename: file.filename.clone(),
            mimetype: file.mimetype.clone(),
            position: file.position,
            size: file.data.len() as i64,
        }
    }
}

/// DTO for adding a template file to a part.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTemplateRequest {
    #[validate(custom(function = validate_filename))]
    pub filename: String,
    #[validate(custom(function = validate_mimetype))]
    pub mimetype: String,
    pub position: Option<i64>,
    #[validate(length(max = 1000000))]
    pub content: String,
}

/// DTO for saving a learner's edits to a workspace file.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateFileRequest {
    #[validate(length(max = 1000000))]
    pub content: String,
}

/// DTO for discarding workspace changes. Without a filename, all files are reset.
#[derive(Debug, Default, Deserialize)]
pub struct ResetFilesRequest {
    pub filename: Option<String>,
}

fn validate_filename(filename: &str) -> Result<(), validator::ValidationError> {
    if !FILENAME_RE.is_match(filename) {
        return Err(validator::ValidationError::new("invalid_filename"));
    }
    Ok(())
}

fn validate_mimetype(mimetype: &str) -> Result<(), validator::ValidationError> {
    if mimetype.len() > 255 || !MIMETYPE_RE.is_match(mimetype) {
        return Err(validator::ValidationError::new("invalid_mimetype"));
    }
    Ok(())
}
