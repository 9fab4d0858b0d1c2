// src/progress.rs

//! Per-learner progress and workspace files.
//!
//! A learner's progress is tracked on the part that owns the files: a page's
//! parent tutorial, or the tutorial / exercise / task itself. Modules carry
//! no progress. Workspace files are copies of the owning part's templates;
//! synchronisation only ever adds missing copies and aligns their position,
//! so a learner's edits are never overwritten. Files are deleted only through
//! [`reset_files`].

use sqlx::{SqliteExecutor, SqlitePool};

use crate::models::file::{TemplateFile, WorkspaceFile};
use crate::models::part::{Part, PartType};
use crate::models::progress::{PartProgress, UserPartProgress};

const PROGRESS_COLUMNS: &str = "id, user_id, part_id, current_id, visited, created_at";
const FILE_COLUMNS: &str = "id, progress_id, filename, mimetype, position, data";

/// The part whose templates and progress apply when `part` is viewed.
pub fn owning_part_id(part: &Part) -> Option<i64> {
    match part.part_type {
        PartType::Page => part.parent_id,
        part_type if part_type.tracks_progress() => Some(part.id),
        _ => None,
    }
}

/// Returns the learner's progress for `part`, creating it on first access and
/// bringing its workspace files in line with the owning part's templates.
///
/// Viewing a page also records it as the current page and as visited.
/// Returns `None` for parts that do not track progress.
pub async fn get_user_part_progress(
    pool: &SqlitePool,
    user_id: i64,
    part: &Part,
) -> Result<Option<PartProgress>, sqlx::Error> {
    let Some(owner_id) = owning_part_id(part) else {
        return Ok(None);
    };
    let current_page = (part.part_type == PartType::Page).then_some(part.id);

    let mut tx = pool.begin().await?;

    // Write first so the transaction holds the write lock before reading.
    sqlx::query(
        "INSERT INTO user_part_progress (user_id, part_id, current_id, visited) \
         VALUES (?, ?, ?, '{}') \
         ON CONFLICT (user_id, part_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(owner_id)
    .bind(current_page)
    .execute(&mut *tx)
    .await?;

    let query =
        format!("SELECT {PROGRESS_COLUMNS} FROM user_part_progress WHERE user_id = ? AND part_id = ?");
    let mut progress = sqlx::query_as::<_, UserPartProgress>(&query)
        .bind(user_id)
        .bind(owner_id)
        .fetch_one(&mut *tx)
        .await?;

    if let Some(page_id) = current_page {
        let key = page_id.to_string();
        if progress.current_id != Some(page_id) || !progress.visited.0.contains_key(&key) {
            progress.visited.0.entry(key).or_default();
            progress.current_id = Some(page_id);
            sqlx::query("UPDATE user_part_progress SET current_id = ?, visited = ? WHERE id = ?")
                .bind(page_id)
                .bind(&progress.visited)
                .bind(progress.id)
                .execute(&mut *tx)
                .await?;
        }
    }

    let templates = sqlx::query_as::<_, TemplateFile>(
        "SELECT id, part_id, filename, mimetype, position, data FROM template_files \
         WHERE part_id = ? ORDER BY position, id",
    )
    .bind(owner_id)
    .fetch_all(&mut *tx)
    .await?;

    let existing = list_files(&mut *tx, progress.id).await?;

    for template in &templates {
        let matching = existing
            .iter()
            .find(|f| f.filename == template.filename && f.mimetype == template.mimetype);
        match matching {
            Some(file) if file.position != template.position => {
                sqlx::query("UPDATE workspace_files SET position = ? WHERE id = ?")
                    .bind(template.position)
                    .bind(file.id)
                    .execute(&mut *tx)
                    .await?;
            }
            Some(_) => {}
            None => {
                sqlx::query(
                    "INSERT INTO workspace_files (progress_id, filename, mimetype, position, data) \
                     VALUES (?, ?, ?, ?, ?) \
                     ON CONFLICT (progress_id, filename, mimetype) DO NOTHING",
                )
                .bind(progress.id)
                .bind(&template.filename)
                .bind(&template.mimetype)
                .bind(template.position)
                .bind(&template.data)
                .execute(&mut *tx)
                .await?;
                tracing::debug!(
                    progress_id = progress.id,
                    filename = %template.filename,
                    "Workspace file created from template"
                );
            }
        }
    }

    let files = list_files(&mut *tx, progress.id).await?;
    tx.commit().await?;

    Ok(Some(PartProgress { progress, files }))
}

/// Deletes the progress' workspace files, or only those named `filename`.
/// The next call to [`get_user_part_progress`] recreates them from templates.
pub async fn reset_files(
    pool: &SqlitePool,
    progress_id: i64,
    filename: Option<&str>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM workspace_files WHERE progress_id = ? AND (? IS NULL OR filename = ?)",
    )
    .bind(progress_id)
    .bind(filename)
    .bind(filename)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Adds `duration_ms` (rounded down to whole seconds) to the time spent on a page.
pub async fn record_duration(
    pool: &SqlitePool,
    progress_id: i64,
    page_id: i64,
    duration_ms: i64,
) -> Result<(), sqlx::Error> {
    let path = format!("$.\"{page_id}\"");
    sqlx::query(
        "UPDATE user_part_progress \
         SET visited = json_set(visited, ?, json_object('duration', \
             COALESCE(json_extract(visited, ? || '.duration'), 0) + ?)) \
         WHERE id = ?",
    )
    .bind(&path)
    .bind(&path)
    .bind(duration_ms / 1000)
    .bind(progress_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn workspace_file(
    pool: &SqlitePool,
    progress_id: i64,
    file_id: i64,
) -> Result<Option<WorkspaceFile>, sqlx::Error> {
    let query =
        format!("SELECT {FILE_COLUMNS} FROM workspace_files WHERE id = ? AND progress_id = ?");
    sqlx::query_as::<_, WorkspaceFile>(&query)
        .bind(file_id)
        .bind(progress_id)
        .fetch_optional(pool)
        .await
}

/// Replaces a workspace file's content. Returns false if the file is not part of the progress.
pub async fn update_workspace_file(
    pool: &SqlitePool,
    progress_id: i64,
    file_id: i64,
    data: &[u8],
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE workspace_files SET data = ? WHERE id = ? AND progress_id = ?")
        .bind(data)
        .bind(file_id)
        .bind(progress_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

async fn list_files<'c>(
    conn: impl SqliteExecutor<'c>,
    progress_id: i64,
) -> Result<Vec<WorkspaceFile>, sqlx::Error> {
    let query = format!(
        "SELECT {FILE_COLUMNS} FROM workspace_files WHERE progress_id = ? ORDER BY position, id"
    );
    sqlx::query_as::<_, WorkspaceFile>(&query)
        .bind(progress_id)
        .fetch_all(conn)
        .await
}
