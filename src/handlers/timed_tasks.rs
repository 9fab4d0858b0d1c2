// src/handlers/timed_tasks.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::AppError,
    handlers::load_part,
    models::{
        part::Part,
        timed_task::{CreateTimedTaskRequest, TimedTask, UpdateTimedTaskRequest},
    },
    policy::{self, Action, Subject},
    repositories::TimedTaskRepo,
    timed_tasks::ActionRegistry,
    utils::jwt::Claims,
};

/// Timed tasks are managed by whoever may edit the part.
async fn editable_part(pool: &SqlitePool, claims: &Claims, pid: i64) -> Result<Part, AppError> {
    let subject = Subject::try_from(claims)?;
    let part = load_part(pool, pid).await?;
    policy::require(pool, &subject, Action::Edit, &part).await?;
    Ok(part)
}

async fn load_task(pool: &SqlitePool, part: &Part, tid: i64) -> Result<TimedTask, AppError> {
    TimedTaskRepo::find_for_part(pool, part.id, tid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Timed task {} not found", tid)))
}

pub async fn list_tasks(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(pid): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let part = editable_part(&pool, &claims, pid).await?;
    let tasks = TimedTaskRepo::list_for_part(&pool, part.id).await?;
    Ok(Json(tasks))
}

/// Creates a task in state `new`. Only registered actions are accepted.
pub async fn create_task(
    State(pool): State<SqlitePool>,
    State(actions): State<Arc<ActionRegistry>>,
    Extension(claims): Extension<Claims>,
    Path(pid): Path<i64>,
    Json(payload): Json<CreateTimedTaskRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let part = editable_part(&pool, &claims, pid).await?;

    let action = actions.get(&payload.name).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Unknown action '{}', expected one of: {}",
            payload.name,
            actions.names().join(", ")
        ))
    })?;

    let task = TimedTaskRepo::create(&pool, part.id, &payload.name, action.title()).await?;
    tracing::info!(task_id = task.id, part_id = part.id, action = %task.name, "Timed task created");

    Ok((StatusCode::CREATED, Json(task)))
}

/// Confirms timestamp and options; the task becomes `ready`.
pub async fn update_task(
    State(pool): State<SqlitePool>,
    State(actions): State<Arc<ActionRegistry>>,
    Extension(claims): Extension<Claims>,
    Path((pid, tid)): Path<(i64, i64)>,
    Json(payload): Json<UpdateTimedTaskRequest>,
) -> Result<impl IntoResponse, AppError> {
    let part = editable_part(&pool, &claims, pid).await?;
    let task = load_task(&pool, &part, tid).await?;

    let action = actions
        .get(&task.name)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown action '{}'", task.name)))?;
    action
        .validate_options(&part, &payload.options)
        .map_err(AppError::BadRequest)?;

    let task = TimedTaskRepo::schedule(&pool, task.id, payload.timestamp, &payload.options)
        .await?
        .ok_or_else(|| AppError::Conflict("Timed task is currently running".to_string()))?;
    tracing::info!(task_id = task.id, timestamp = ?task.timestamp, "Timed task scheduled");

    Ok(Json(task))
}

pub async fn delete_task(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path((pid, tid)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let part = editable_part(&pool, &claims, pid).await?;
    let task = load_task(&pool, &part, tid).await?;

    if !TimedTaskRepo::delete(&pool, task.id).await? {
        return Err(AppError::Conflict("Timed task is currently running".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
