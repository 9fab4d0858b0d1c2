// src/timed_tasks/mod.rs

//! Deferred content changes ("timed tasks").
//!
//! Authors schedule a task against a part; the `wte-run-timed-tasks` binary
//! periodically claims every due task, executes it through the
//! [`ActionRegistry`], and reconciles the outcome in the `timed_tasks` table.
//! Only one runner should be scheduled per deployment; overlapping runs are
//! kept apart by the claim UPDATE but are not otherwise coordinated.

pub mod change_status;
pub mod registry;
pub mod runner;

use std::time::Duration;

use thiserror::Error;

pub use change_status::ChangeStatusAction;
pub use registry::{ActionRegistry, TaskAction};
pub use runner::{RunSummary, RunnerError, RunnerOptions, TimedTaskRunner};

/// Why a single task ended up `failed`. The message is stored on the row.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("missing option '{0}'")]
    MissingOption(&'static str),

    #[error("invalid value '{value}' for option '{name}'")]
    InvalidOption { name: &'static str, value: String },

    #[error("part {0} no longer exists")]
    PartNotFound(i64),

    #[error("task is no longer claimed by this run")]
    ClaimLost,

    #[error("timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
