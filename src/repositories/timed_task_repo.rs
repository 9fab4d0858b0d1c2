// src/repositories/timed_task_repo.rs

//! Repository for the `timed_tasks` table.
//!
//! Status transitions of the runner are single conditional UPDATEs keyed by
//! the run id in `claim_token`, so a row can only be moved by the invocation
//! that claimed it.

use chrono::{DateTime, Utc};
use sqlx::{SqliteExecutor, SqlitePool, types::Json};

use crate::models::timed_task::{TaskOptions, TaskStatus, TimedTask};

/// Column list for `timed_tasks` queries.
const COLUMNS: &str = "\
    id, part_id, name, title, timestamp, options, status, \
    claim_token, claimed_at, message, created_at";

pub struct TimedTaskRepo;

impl TimedTaskRepo {
    pub async fn create(
        pool: &SqlitePool,
        part_id: i64,
        name: &str,
        title: &str,
    ) -> Result<TimedTask, sqlx::Error> {
        let query = format!(
            "INSERT INTO timed_tasks (part_id, name, title, status) VALUES (?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TimedTask>(&query)
            .bind(part_id)
            .bind(name)
            .bind(title)
            .bind(TaskStatus::New)
            .fetch_one(pool)
            .await
    }

    pub async fn find_for_part(
        pool: &SqlitePool,
        part_id: i64,
        id: i64,
    ) -> Result<Option<TimedTask>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM timed_tasks WHERE id = ? AND part_id = ?");
        sqlx::query_as::<_, TimedTask>(&query)
            .bind(id)
            .bind(part_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_part(
        pool: &SqlitePool,
        part_id: i64,
    ) -> Result<Vec<TimedTask>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM timed_tasks WHERE part_id = ? ORDER BY timestamp, id"
        );
        sqlx::query_as::<_, TimedTask>(&query)
            .bind(part_id)
            .fetch_all(pool)
            .await
    }

    /// Confirms timestamp and options and makes the task claimable.
    ///
    /// Returns `None` if the task is currently claimed by a runner.
    pub async fn schedule(
        pool: &SqlitePool,
        id: i64,
        timestamp: DateTime<Utc>,
        options: &TaskOptions,
    ) -> Result<Option<TimedTask>, sqlx::Error> {
        let query = format!(
            "UPDATE timed_tasks \
             SET timestamp = ?, options = ?, status = ?, \
                 claim_token = NULL, claimed_at = NULL, message = NULL \
             WHERE id = ? AND status <> ? \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TimedTask>(&query)
            .bind(timestamp)
            .bind(Json(options))
            .bind(TaskStatus::Ready)
            .bind(id)
            .bind(TaskStatus::Running)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM timed_tasks WHERE id = ? AND status <> ?")
            .bind(id)
            .bind(TaskStatus::Running)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Atomically claims every `ready` task due at `now` for the given run.
    ///
    /// This single UPDATE is the only mutual exclusion between overlapping
    /// runner invocations.
    pub async fn claim_due(
        pool: &SqlitePool,
        run_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE timed_tasks \
             SET status = ?, claim_token = ?, claimed_at = ?, message = NULL \
             WHERE status = ? AND timestamp IS NOT NULL AND timestamp <= ?",
        )
        .bind(TaskStatus::Running)
        .bind(run_id)
        .bind(now)
        .bind(TaskStatus::Ready)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_claimed(
        pool: &SqlitePool,
        run_id: &str,
    ) -> Result<Vec<TimedTask>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM timed_tasks WHERE status = ? AND claim_token = ? ORDER BY id"
        );
        sqlx::query_as::<_, TimedTask>(&query)
            .bind(TaskStatus::Running)
            .bind(run_id)
            .fetch_all(pool)
            .await
    }

    /// Marks a claimed task completed. Runs on the caller's transaction so the
    /// marking commits or rolls back together with the task's effect.
    pub async fn mark_completed<'c>(
        conn: impl SqliteExecutor<'c>,
        id: i64,
        run_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE timed_tasks SET status = ? \
             WHERE id = ? AND status = ? AND claim_token = ?",
        )
        .bind(TaskStatus::Completed)
        .bind(id)
        .bind(TaskStatus::Running)
        .bind(run_id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_failed(
        pool: &SqlitePool,
        id: i64,
        run_id: &str,
        reason: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE timed_tasks SET status = ?, message = ? \
             WHERE id = ? AND status = ? AND claim_token = ?",
        )
        .bind(TaskStatus::Failed)
        .bind(reason)
        .bind(id)
        .bind(TaskStatus::Running)
        .bind(run_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Fails every task of this run that is still `running`.
    pub async fn sweep_unfinished(
        pool: &SqlitePool,
        run_id: &str,
        reason: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE timed_tasks SET status = ?, message = ? \
             WHERE status = ? AND claim_token = ?",
        )
        .bind(TaskStatus::Failed)
        .bind(reason)
        .bind(TaskStatus::Running)
        .bind(run_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
