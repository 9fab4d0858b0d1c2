// src/models/timed_task.rs

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use validator::Validate;

/// Free-form options of a timed task (e.g. `target_status`).
pub type TaskOptions = serde_json::Map<String, serde_json::Value>;

/// Lifecycle of a timed task.
///
/// `new -> ready -> running -> completed | failed`. While `running`, the
/// `claim_token` column holds the id of the runner invocation that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TaskStatus {
    New,
    Ready,
    Running,
    Completed,
    Failed,
}

/// Represents the 'timed_tasks' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TimedTask {
    pub id: i64,
    pub part_id: i64,

    /// Registered action name, e.g. "change_status".
    pub name: String,

    pub title: String,

    /// When the task becomes due. Unset until the author confirms it.
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,

    pub options: Json<TaskOptions>,

    pub status: TaskStatus,

    /// Run id of the runner invocation that claimed the task.
    pub claim_token: Option<String>,
    pub claimed_at: Option<chrono::DateTime<chrono::Utc>>,

    /// Failure reason recorded by the runner.
    pub message: Option<String>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a timed task; it starts out as `new`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTimedTaskRequest {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
}

/// DTO for confirming a task's schedule, which moves it to `ready`.
#[derive(Debug, Deserialize)]
pub struct UpdateTimedTaskRequest {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub options: TaskOptions,
}
