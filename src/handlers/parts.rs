// src/handlers/parts.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    handlers::load_part,
    models::{
        file::{CreateTemplateRequest, FileSummary, TemplateFile},
        part::{
            ChangeStatusRequest, CreatePartRequest, Part, PartStatus, PartSummary, PartType,
            UpdatePartRequest,
        },
        progress::ProgressResponse,
        user::PartRole,
    },
    policy::{self, Action, Decision, Subject},
    progress::get_user_part_progress,
    quiz::{extract_quizzes, sync_quizzes},
    repositories::PartRepo,
    utils::{
        html::{clean_html, hide_answer_keys},
        jwt::Claims,
    },
};

/// A part with its children and, for learners, their progress on it.
#[derive(Debug, Serialize)]
pub struct PartDetail {
    #[serde(flatten)]
    pub part: Part,
    pub children: Vec<PartSummary>,
    pub progress: Option<ProgressResponse>,
}

/// Lists the modules open to everyone.
pub async fn list_modules(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let modules = PartRepo::modules_with_status(&pool, PartStatus::Available).await?;
    Ok(Json(modules))
}

/// Creates a part.
///
/// Modules can only be created by admins; the creator becomes the module's
/// owner. Everything else needs edit rights on the parent.
pub async fn create_part(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreatePartRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let subject = Subject::try_from(&claims)?;

    let parent = match payload.parent_id {
        Some(parent_id) => {
            let parent = load_part(&pool, parent_id).await?;
            policy::require(&pool, &subject, Action::Edit, &parent).await?;
            Some(parent)
        }
        None => {
            if !subject.is_admin {
                return Err(AppError::Forbidden("Only admins may create modules".to_string()));
            }
            None
        }
    };

    if !payload
        .part_type
        .allowed_under(parent.as_ref().map(|p| p.part_type))
    {
        return Err(AppError::BadRequest(format!(
            "A {:?} cannot be placed here",
            payload.part_type
        )));
    }

    let content = clean_html(payload.content.as_deref().unwrap_or_default());

    let mut tx = pool.begin().await?;
    let part = PartRepo::create(
        &mut *tx,
        payload.parent_id,
        payload.part_type,
        &payload.title,
        &content,
        payload.position,
    )
    .await?;
    if part.part_type == PartType::Module {
        PartRepo::grant_role(&mut *tx, subject.user_id, part.id, PartRole::Owner).await?;
    }
    sync_quizzes(&mut tx, part.id, &extract_quizzes(&part.content)).await?;
    tx.commit().await?;

    tracing::info!(part_id = part.id, part_type = ?part.part_type, user_id = subject.user_id, "Part created");
    Ok((StatusCode::CREATED, Json(part)))
}

/// Shows a part with its children and the caller's progress.
///
/// Callers without edit rights only see available children, and get the
/// content without quiz answer keys.
pub async fn get_part(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(pid): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let subject = Subject::try_from(&claims)?;
    let mut part = load_part(&pool, pid).await?;

    let context = policy::load_context(&pool, &subject, &part).await?;
    let resource = context.resource(&part);
    if policy::authorize(&subject, Action::View, &resource) == Decision::Deny {
        return Err(AppError::Forbidden("Not allowed to view this part".to_string()));
    }
    let can_edit = policy::authorize(&subject, Action::Edit, &resource) == Decision::Allow;

    let mut children = PartRepo::children(&pool, part.id).await?;
    if !can_edit {
        children.retain(|child| child.status == PartStatus::Available);
        part.content = hide_answer_keys(&part.content);
    }

    let progress = get_user_part_progress(&pool, subject.user_id, &part)
        .await?
        .as_ref()
        .map(ProgressResponse::from);

    Ok(Json(PartDetail {
        part,
        children,
        progress,
    }))
}

/// Edits title, content or position. New content is sanitized and its quizzes re-extracted.
pub async fn update_part(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(pid): Path<i64>,
    Json(payload): Json<UpdatePartRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let subject = Subject::try_from(&claims)?;
    let part = load_part(&pool, pid).await?;
    policy::require(&pool, &subject, Action::Edit, &part).await?;

    let content = payload.content.as_deref().map(clean_html);

    let mut tx = pool.begin().await?;
    let updated = PartRepo::update(
        &mut *tx,
        part.id,
        payload.title.as_deref(),
        content.as_deref(),
        payload.position,
    )
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Part {} not found", pid)))?;
    if content.is_some() {
        sync_quizzes(&mut tx, updated.id, &extract_quizzes(&updated.content)).await?;
    }
    tx.commit().await?;

    Ok(Json(updated))
}

/// Deletes a part together with everything below it.
pub async fn delete_part(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(pid): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let subject = Subject::try_from(&claims)?;
    let part = load_part(&pool, pid).await?;
    policy::require(&pool, &subject, Action::Delete, &part).await?;

    if !PartRepo::delete(&pool, part.id).await? {
        return Err(AppError::NotFound(format!("Part {} not found", pid)));
    }

    tracing::info!(part_id = pid, user_id = subject.user_id, "Part deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Changes a part's status right away (timed tasks do the same later).
pub async fn change_status(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(pid): Path<i64>,
    Json(payload): Json<ChangeStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let subject = Subject::try_from(&claims)?;
    let mut part = load_part(&pool, pid).await?;
    policy::require(&pool, &subject, Action::Edit, &part).await?;

    if !payload.status.valid_for(part.part_type) {
        return Err(AppError::BadRequest(format!(
            "Status {:?} is not valid for a {:?}",
            payload.status, part.part_type
        )));
    }

    PartRepo::set_status(&pool, part.id, payload.status).await?;
    part.status = payload.status;

    Ok(Json(part))
}

/// Enrols the caller as a student of a module.
pub async fn enrol(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(pid): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let subject = Subject::try_from(&claims)?;
    let module = load_module(&pool, pid).await?;
    policy::require(&pool, &subject, Action::View, &module).await?;

    PartRepo::grant_role(&pool, subject.user_id, module.id, PartRole::Student).await?;
    tracing::info!(part_id = module.id, user_id = subject.user_id, "User enrolled");

    Ok(StatusCode::NO_CONTENT)
}

/// Removes the caller's enrolment. Ownership is not affected.
pub async fn deenrol(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(pid): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let subject = Subject::try_from(&claims)?;
    let module = load_module(&pool, pid).await?;

    if !PartRepo::revoke_role(&pool, subject.user_id, module.id, PartRole::Student).await? {
        return Err(AppError::NotFound("Not enrolled in this module".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn load_module(pool: &SqlitePool, pid: i64) -> Result<Part, AppError> {
    let part = load_part(pool, pid).await?;
    if part.part_type != PartType::Module {
        return Err(AppError::BadRequest("Only modules support enrolment".to_string()));
    }
    Ok(part)
}

/// Lists the template files of a part.
pub async fn list_templates(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(pid): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let subject = Subject::try_from(&claims)?;
    let part = load_part(&pool, pid).await?;
    policy::require(&pool, &subject, Action::Edit, &part).await?;

    let templates = sqlx::query_as::<_, FileSummary>(
        "SELECT id, filename, mimetype, position, length(data) AS size FROM template_files \
         WHERE part_id = ? ORDER BY position, id",
    )
    .bind(part.id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(templates))
}

/// Adds a template file. Learners receive a copy the next time they open the part.
pub async fn create_template(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(pid): Path<i64>,
    Json(payload): Json<CreateTemplateRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let subject = Subject::try_from(&claims)?;
    let part = load_part(&pool, pid).await?;
    policy::require(&pool, &subject, Action::Edit, &part).await?;

    if !part.part_type.tracks_progress() {
        return Err(AppError::BadRequest(format!(
            "A {:?} cannot have template files",
            part.part_type
        )));
    }

    let template = sqlx::query_as::<_, TemplateFile>(
        "INSERT INTO template_files (part_id, filename, mimetype, position, data) \
         VALUES (?, ?, ?, COALESCE(?, \
             (SELECT COALESCE(MAX(position), -1) + 1 FROM template_files WHERE part_id = ?)), ?) \
         RETURNING id, part_id, filename, mimetype, position, data",
    )
    .bind(part.id)
    .bind(&payload.filename)
    .bind(&payload.mimetype)
    .bind(payload.position)
    .bind(part.id)
    .bind(payload.content.as_bytes())
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!(
                "Template '{}' ({}) already exists",
                payload.filename, payload.mimetype
            ))
        } else {
            AppError::from(e)
        }
    })?;

    Ok((StatusCode::CREATED, Json(FileSummary::from(&template))))
}
