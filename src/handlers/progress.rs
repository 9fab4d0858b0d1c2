// src/handlers/progress.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::AppError,
    handlers::load_part,
    models::{
        file::{ResetFilesRequest, UpdateFileRequest},
        part::{Part, PartType},
        progress::{PartProgress, ProgressResponse, RecordDurationRequest},
    },
    policy::{self, Action, Subject},
    progress,
    utils::jwt::Claims,
};

/// Checks view access and materializes the caller's progress on the part.
async fn viewable_progress(
    pool: &SqlitePool,
    claims: &Claims,
    pid: i64,
) -> Result<(Part, PartProgress), AppError> {
    let subject = Subject::try_from(claims)?;
    let part = load_part(pool, pid).await?;
    policy::require(pool, &subject, Action::View, &part).await?;

    let progress = progress::get_user_part_progress(pool, subject.user_id, &part)
        .await?
        .ok_or_else(|| {
            AppError::BadRequest(format!("A {:?} does not track progress", part.part_type))
        })?;
    Ok((part, progress))
}

pub async fn get_progress(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(pid): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let (_, progress) = viewable_progress(&pool, &claims, pid).await?;
    Ok(Json(ProgressResponse::from(&progress)))
}

/// Adds time spent on a page.
pub async fn record_duration(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(pid): Path<i64>,
    Json(payload): Json<RecordDurationRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let (part, progress) = viewable_progress(&pool, &claims, pid).await?;
    if part.part_type != PartType::Page {
        return Err(AppError::BadRequest("Durations are recorded on pages".to_string()));
    }

    progress::record_duration(&pool, progress.progress.id, part.id, payload.duration).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Discards the caller's changes and returns the freshly copied files.
pub async fn reset_files(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(pid): Path<i64>,
    Json(payload): Json<ResetFilesRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (part, progress) = viewable_progress(&pool, &claims, pid).await?;

    let removed =
        progress::reset_files(&pool, progress.progress.id, payload.filename.as_deref()).await?;
    tracing::info!(
        progress_id = progress.progress.id,
        removed,
        filename = ?payload.filename,
        "Workspace files reset"
    );

    let progress = progress::get_user_part_progress(&pool, progress.progress.user_id, &part)
        .await?
        .ok_or_else(|| AppError::InternalServerError("Progress vanished".to_string()))?;
    Ok(Json(ProgressResponse::from(&progress)))
}

/// Returns a workspace file's raw content with its mimetype.
pub async fn get_file(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path((pid, fid)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let (_, progress) = viewable_progress(&pool, &claims, pid).await?;

    let file = progress::workspace_file(&pool, progress.progress.id, fid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("File {} not found", fid)))?;

    Ok(([(header::CONTENT_TYPE, file.mimetype)], file.data))
}

/// Saves the caller's edits to a workspace file.
pub async fn update_file(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path((pid, fid)): Path<(i64, i64)>,
    Json(payload): Json<UpdateFileRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let (_, progress) = viewable_progress(&pool, &claims, pid).await?;

    if !progress::update_workspace_file(&pool, progress.progress.id, fid, payload.content.as_bytes())
        .await?
    {
        return Err(AppError::NotFound(format!("File {} not found", fid)));
    }

    Ok(StatusCode::NO_CONTENT)
}
