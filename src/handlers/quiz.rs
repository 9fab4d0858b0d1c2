// src/handlers/quiz.rs

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    response::IntoResponse,
};
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::AppError,
    handlers::load_part,
    models::quiz::{CheckAnswerParams, Quiz, SetAnswerRequest},
    policy::{self, Action, Subject},
    quiz,
    utils::jwt::Claims,
};

async fn viewable_quiz(
    pool: &SqlitePool,
    subject: &Subject,
    pid: i64,
    name: &str,
) -> Result<Quiz, AppError> {
    let part = load_part(pool, pid).await?;
    policy::require(pool, subject, Action::View, &part).await?;

    quiz::find_quiz(pool, part.id, name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Quiz '{}' not found", name)))
}

/// Submits an answer. Correctness is decided here, never by the client.
pub async fn set_answer(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(pid): Path<i64>,
    Json(payload): Json<SetAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let subject = Subject::try_from(&claims)?;
    let quiz = viewable_quiz(&pool, &subject, pid, &payload.quiz).await?;

    let question = quiz.question(&payload.question).ok_or_else(|| {
        AppError::NotFound(format!("Question '{}' not found", payload.question))
    })?;

    let status =
        quiz::set_answer(&pool, subject.user_id, &quiz, question, &payload.answer).await?;
    tracing::debug!(user_id = subject.user_id, quiz_id = quiz.id, question = %question.name, ?status, "Answer recorded");

    Ok(Json(status))
}

pub async fn check_answer(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(pid): Path<i64>,
    Query(params): Query<CheckAnswerParams>,
) -> Result<impl IntoResponse, AppError> {
    let subject = Subject::try_from(&claims)?;
    let quiz = viewable_quiz(&pool, &subject, pid, &params.quiz).await?;

    if quiz.question(&params.question).is_none() {
        return Err(AppError::NotFound(format!("Question '{}' not found", params.question)));
    }

    let status = quiz::check_answer(&pool, subject.user_id, quiz.id, &params.question).await?;
    Ok(Json(status))
}
