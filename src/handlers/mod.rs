// src/handlers/mod.rs

pub mod auth;
pub mod parts;
pub mod progress;
pub mod quiz;
pub mod timed_tasks;

use sqlx::SqlitePool;

use crate::{error::AppError, models::part::Part, repositories::PartRepo};

/// Loads a part or answers 404.
pub(crate) async fn load_part(pool: &SqlitePool, id: i64) -> Result<Part, AppError> {
    PartRepo::find_by_id(pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Part {} not found", id)))
}
