//! Axum Handlers for the REST API
//!
//! This module contains the operator-facing exam endpoints. It uses `utoipa`
//! doc comments to generate OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use examiner_core::{ExamError, Session, select_topics};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    models::{ErrorResponse, ExamView, StartExamPayload, SubmitAnswerPayload},
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Conflict(message) => {
                (StatusCode::CONFLICT, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// What an exam endpoint asks the orchestrator to do.
enum ExamAction {
    Start,
    Answer(String),
    Resume,
}

async fn find_exam(state: &AppState, id: Uuid) -> Result<Arc<Mutex<Session>>, ApiError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Exam with id '{}' not found", id)))
}

/// Runs one orchestrator action against an exam and renders the outcome.
///
/// The work runs in its own task so a client disconnect cannot interrupt a
/// model call halfway through. Recoverable failures are returned inside the
/// view. The task itself drops finished exams with a saved result from the
/// table, so that happens even if nobody is waiting for the response.
async fn run_action(
    state: &AppState,
    id: Uuid,
    slot: Arc<Mutex<Session>>,
    action: ExamAction,
) -> Result<ExamView, ApiError> {
    let mut session = slot.try_lock_owned().map_err(|_| busy())?;
    let orchestrator = state.orchestrator.clone();
    let sessions = state.sessions.clone();

    tokio::spawn(async move {
        let outcome = match action {
            ExamAction::Start => orchestrator.start(&mut session).await,
            ExamAction::Answer(text) => orchestrator.submit_answer(&mut session, text).await,
            ExamAction::Resume => orchestrator.resume(&mut session).await,
        };
        let error = match outcome {
            Ok(()) => None,
            Err(e @ (ExamError::Finished | ExamError::NotAwaitingCandidate(_))) => {
                return Err(ApiError::Conflict(e.to_string()));
            }
            Err(e) => {
                warn!(exam_id = %id, error = %e, "Exam action failed");
                Some(e.to_string())
            }
        };
        let view = ExamView::new(id, &session, error);
        if session.is_discardable() {
            sessions.remove(id).await;
            info!(exam_id = %id, "Exam completed and discarded");
        }
        Ok(view)
    })
    .await?
}

fn busy() -> ApiError {
    ApiError::Conflict("The exam is busy with another request".to_string())
}

/// Start a new exam for a candidate.
#[utoipa::path(
    post,
    path = "/exams",
    request_body = StartExamPayload,
    responses(
        (status = 201, description = "Exam started; the first question is in the transcript", body = ExamView),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn start_exam(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StartExamPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let name = payload.name.trim();
    let email = payload.email.trim();
    if name.is_empty() || email.is_empty() {
        return Err(ApiError::BadRequest(
            "Both name and email are required".to_string(),
        ));
    }

    let added = state.registry.register(email, name).await?;
    let topics = select_topics(&state.catalog, state.topics_per_exam, &mut rand::rng())?;
    info!(candidate = %email, new_student = added, ?topics, "Starting exam");

    let (id, slot) = state.sessions.insert(Session::new(email, topics)).await;
    let view = run_action(&state, id, slot, ExamAction::Start).await?;

    Ok((StatusCode::CREATED, Json(view)))
}

/// Submit the candidate's answer and receive the examiner's reply.
#[utoipa::path(
    post,
    path = "/exams/{id}/answers",
    request_body = SubmitAnswerPayload,
    responses(
        (status = 200, description = "Updated exam view", body = ExamView),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 404, description = "Exam not found", body = ErrorResponse),
        (status = 409, description = "Exam finished or busy", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Exam ID")
    )
)]
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitAnswerPayload>,
) -> Result<Json<ExamView>, ApiError> {
    if payload.text.trim().is_empty() {
        return Err(ApiError::BadRequest("Answer text is required".to_string()));
    }
    let slot = find_exam(&state, id).await?;
    let view = run_action(&state, id, slot, ExamAction::Answer(payload.text)).await?;
    Ok(Json(view))
}

/// Retry the last failed step of an exam without new input.
#[utoipa::path(
    post,
    path = "/exams/{id}/resume",
    responses(
        (status = 200, description = "Updated exam view", body = ExamView),
        (status = 404, description = "Exam not found", body = ErrorResponse),
        (status = 409, description = "Exam finished or busy", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Exam ID")
    )
)]
pub async fn resume_exam(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExamView>, ApiError> {
    let slot = find_exam(&state, id).await?;
    let view = run_action(&state, id, slot, ExamAction::Resume).await?;
    Ok(Json(view))
}

/// Get the current view of an exam, including progress.
///
/// Answers `409` instead of waiting while the examiner is generating.
#[utoipa::path(
    get,
    path = "/exams/{id}",
    responses(
        (status = 200, description = "Exam details", body = ExamView),
        (status = 404, description = "Exam not found", body = ErrorResponse),
        (status = 409, description = "Exam busy generating a reply", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Exam ID")
    )
)]
pub async fn get_exam(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExamView>, ApiError> {
    let slot = find_exam(&state, id).await?;
    let session = slot.try_lock().map_err(|_| busy())?;
    Ok(Json(ExamView::new(id, &session, None)))
}
