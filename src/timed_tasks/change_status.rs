// src/timed_tasks/change_status.rs

use async_trait::async_trait;
use sqlx::SqliteConnection;

use crate::models::part::{Part, PartStatus};
use crate::models::timed_task::{TaskOptions, TimedTask};
use crate::repositories::PartRepo;
use crate::timed_tasks::{TaskAction, TaskError};

const TARGET_STATUS: &str = "target_status";

/// Sets the part's status to `options.target_status`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeStatusAction;

impl ChangeStatusAction {
    pub const NAME: &'static str = "change_status";
}

/// Reads and checks `target_status`. `archived` is only valid for modules.
fn target_status(part: &Part, options: &TaskOptions) -> Result<PartStatus, TaskError> {
    let value = options
        .get(TARGET_STATUS)
        .ok_or(TaskError::MissingOption(TARGET_STATUS))?;
    let invalid = || TaskError::InvalidOption {
        name: TARGET_STATUS,
        value: value.to_string(),
    };
    let status = value.as_str().and_then(PartStatus::parse).ok_or_else(invalid)?;
    if !status.valid_for(part.part_type) {
        return Err(invalid());
    }
    Ok(status)
}

#[async_trait]
impl TaskAction for ChangeStatusAction {
    fn title(&self) -> &str {
        "Change Status"
    }

    fn validate_options(&self, part: &Part, options: &TaskOptions) -> Result<(), String> {
        target_status(part, options)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn execute(&self, conn: &mut SqliteConnection, task: &TimedTask) -> Result<(), TaskError> {
        let part = PartRepo::find_by_id(&mut *conn, task.part_id)
            .await?
            .ok_or(TaskError::PartNotFound(task.part_id))?;
        let status = target_status(&part, &task.options.0)?;

        PartRepo::set_status(&mut *conn, part.id, status).await?;

        tracing::info!(
            task_id = task.id,
            part_id = part.id,
            from = ?part.status,
            to = ?status,
            "Part status changed by timed task"
        );
        Ok(())
    }
}
