// src/timed_tasks/runner.rs

//! Claim / execute / reconcile loop for due timed tasks.
//!
//! One call to [`TimedTaskRunner::run_once`]:
//!
//! 1. claims every `ready` task whose timestamp has passed with a fresh run id,
//! 2. fails claimed tasks whose action is not registered,
//! 3. executes the rest on a bounded set of tokio tasks, each inside a timeout
//!    and its own transaction,
//! 4. waits for all of them, then fails anything of this run still `running`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::{Config, DEFAULT_RUNNER_WORKERS, DEFAULT_TASK_TIMEOUT_SECS};
use crate::models::timed_task::TimedTask;
use crate::repositories::TimedTaskRepo;
use crate::timed_tasks::{ActionRegistry, TaskAction, TaskError};

/// Reason stored on tasks that were still claimed after all units finished.
pub const UNFINISHED_REASON: &str = "task did not complete";

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to claim due tasks: {0}")]
    Claim(#[source] sqlx::Error),

    #[error("failed to load claimed tasks: {0}")]
    Load(#[source] sqlx::Error),

    #[error("failed to sweep unfinished tasks: {0}")]
    Sweep(#[source] sqlx::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct RunnerOptions {
    /// Maximum number of tasks executing at the same time.
    pub workers: usize,
    /// Upper bound for a single task's execution.
    pub task_timeout: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_RUNNER_WORKERS,
            task_timeout: Duration::from_secs(DEFAULT_TASK_TIMEOUT_SECS),
        }
    }
}

impl From<&Config> for RunnerOptions {
    fn from(config: &Config) -> Self {
        Self {
            workers: config.runner_workers,
            task_timeout: config.task_timeout,
        }
    }
}

/// Counts for one invocation. After a run, `completed + failed == claimed`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub claimed: usize,
    pub dispatched: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct TimedTaskRunner {
    pool: SqlitePool,
    registry: Arc<ActionRegistry>,
    options: RunnerOptions,
}

impl TimedTaskRunner {
    pub fn new(pool: SqlitePool, registry: Arc<ActionRegistry>, options: RunnerOptions) -> Self {
        Self {
            pool,
            registry,
            options: RunnerOptions {
                workers: options.workers.max(1),
                ..options
            },
        }
    }

    /// Runs every task that is due now. Individual task failures are recorded
    /// on the task rows; only store-level failures return an error.
    pub async fn run_once(&self) -> Result<RunSummary, RunnerError> {
        let run_id = Uuid::new_v4().to_string();

        TimedTaskRepo::claim_due(&self.pool, &run_id, Utc::now())
            .await
            .map_err(RunnerError::Claim)?;
        let tasks = TimedTaskRepo::list_claimed(&self.pool, &run_id)
            .await
            .map_err(RunnerError::Load)?;

        let mut summary = RunSummary {
            claimed: tasks.len(),
            ..RunSummary::default()
        };
        if tasks.is_empty() {
            tracing::debug!(run_id = %run_id, "No timed tasks due");
            return Ok(summary);
        }
        tracing::info!(run_id = %run_id, tasks = tasks.len(), "Running timed tasks");

        let semaphore = Arc::new(Semaphore::new(self.options.workers));
        let mut units = JoinSet::new();

        for task in tasks {
            let Some(action) = self.registry.get(&task.name) else {
                let err = TaskError::UnknownAction(task.name.clone());
                self.record_failure(&task, &run_id, &err).await;
                continue;
            };

            summary.dispatched += 1;
            let pool = self.pool.clone();
            let run_id = run_id.clone();
            let semaphore = semaphore.clone();
            let timeout = self.options.task_timeout;

            units.spawn(async move {
                // The semaphore is never closed, so acquiring only waits.
                let _permit = semaphore.acquire_owned().await;
                let outcome =
                    match tokio::time::timeout(timeout, execute(&pool, action.as_ref(), &task, &run_id))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(TaskError::TimedOut(timeout)),
                    };
                (task, outcome)
            });
        }

        while let Some(joined) = units.join_next().await {
            match joined {
                Ok((task, Ok(()))) => {
                    summary.completed += 1;
                    tracing::info!(task_id = task.id, action = %task.name, "Timed task completed");
                }
                Ok((task, Err(err))) => {
                    self.record_failure(&task, &run_id, &err).await;
                }
                Err(join_err) => {
                    // Panicked unit: its task is still claimed and gets swept below.
                    tracing::error!(run_id = %run_id, error = %join_err, "Timed task unit aborted");
                }
            }
        }

        let swept = TimedTaskRepo::sweep_unfinished(&self.pool, &run_id, UNFINISHED_REASON)
            .await
            .map_err(RunnerError::Sweep)?;
        if swept > 0 {
            tracing::warn!(run_id = %run_id, swept, "Unfinished timed tasks marked as failed");
        }

        summary.failed = summary.claimed - summary.completed;
        if summary.failed > 0 {
            tracing::error!(
                run_id = %run_id,
                dispatched = summary.dispatched,
                completed = summary.completed,
                failed = summary.failed,
                "{} tasks failed",
                summary.failed
            );
        } else {
            tracing::info!(
                run_id = %run_id,
                dispatched = summary.dispatched,
                completed = summary.completed,
                "All tasks completed"
            );
        }

        Ok(summary)
    }

    /// Stores the failure reason. If that write fails too, the sweep still
    /// moves the task to `failed`, just without the specific reason.
    async fn record_failure(&self, task: &TimedTask, run_id: &str, err: &TaskError) {
        tracing::warn!(task_id = task.id, action = %task.name, error = %err, "Timed task failed");
        if let Err(e) = TimedTaskRepo::mark_failed(&self.pool, task.id, run_id, &err.to_string()).await
        {
            tracing::error!(task_id = task.id, error = %e, "Failed to record timed task failure");
        }
    }
}

/// Marks the task completed and applies its action in one transaction.
///
/// The completion UPDATE comes first so the transaction takes the write lock
/// before the action reads anything.
async fn execute(
    pool: &SqlitePool,
    action: &dyn TaskAction,
    task: &TimedTask,
    run_id: &str,
) -> Result<(), TaskError> {
    let mut tx = pool.begin().await?;

    if !TimedTaskRepo::mark_completed(&mut *tx, task.id, run_id).await? {
        return Err(TaskError::ClaimLost);
    }
    action.execute(&mut tx, task).await?;

    tx.commit().await?;
    Ok(())
}
