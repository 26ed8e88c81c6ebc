//! Handlers for the `/dreams` resource.
//!
//! All endpoints require authentication via [`AuthUser`]. Users only ever
//! see their own dreams; another user's dream answers 404.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use sublym_core::error::CoreError;
use sublym_core::types::DbId;
use sublym_db::models::dream::{CreateDream, Dream, UpdateDream};
use sublym_db::repositories::{DreamRepo, RunRepo};
use sublym_pipeline::admission::{self, StartJob};
use sublym_pipeline::status::{build_view, RunStatusView};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// A dream together with its runs, newest first.
#[derive(Debug, Serialize)]
pub struct DreamDetail {
    #[serde(flatten)]
    pub dream: Dream,
    pub runs: Vec<RunStatusView>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn find_owned(state: &AppState, dream_id: DbId, auth: &AuthUser) -> AppResult<Dream> {
    DreamRepo::find_for_user(&state.pool, dream_id, auth.user_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Dream",
            id: dream_id,
        }))
}

fn validate_description(description: &str) -> AppResult<()> {
    if description.trim().is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "Dream description must not be empty".into(),
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CRUD
// ---------------------------------------------------------------------------

/// POST /api/v1/dreams
///
/// Create a dream in `draft`. Returns 201.
pub async fn create_dream(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateDream>,
) -> AppResult<impl IntoResponse> {
    validate_description(&input.description)?;

    let dream = DreamRepo::create(&state.pool, auth.user_id, &input).await?;
    tracing::info!(dream_id = dream.id, user_id = auth.user_id, "Dream created");

    Ok((StatusCode::CREATED, Json(DataResponse { data: dream })))
}

/// GET /api/v1/dreams
pub async fn list_dreams(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let dreams = DreamRepo::list_by_user(&state.pool, auth.user_id).await?;
    Ok(Json(DataResponse { data: dreams }))
}

/// GET /api/v1/dreams/{id}
pub async fn get_dream(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(dream_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let dream = find_owned(&state, dream_id, &auth).await?;
    let now = Utc::now();
    let runs = RunRepo::list_by_dream(&state.pool, dream.id)
        .await?
        .iter()
        .map(|run| build_view(run, None, now, state.include_cost()))
        .collect();

    Ok(Json(DataResponse {
        data: DreamDetail { dream, runs },
    }))
}

/// PUT /api/v1/dreams/{id}
///
/// Edit description, rejections or photo selection. Refused with 409 while
/// a generation is in progress.
pub async fn update_dream(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(dream_id): Path<DbId>,
    Json(input): Json<UpdateDream>,
) -> AppResult<impl IntoResponse> {
    if let Some(description) = &input.description {
        validate_description(description)?;
    }
    find_owned(&state, dream_id, &auth).await?;

    let dream = DreamRepo::update(&state.pool, dream_id, &input)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::Conflict(
                "Cannot edit a dream while it is being generated".into(),
            ))
        })?;

    Ok(Json(DataResponse { data: dream }))
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// POST /api/v1/dreams/{id}/generate
///
/// Admit a generation and return 202 with the run handle. The worker runs
/// in the background; poll `/runs/{trace_id}` for progress. The body is
/// optional; without one every parameter takes its default.
pub async fn generate(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(dream_id): Path<DbId>,
    input: Option<Json<StartJob>>,
) -> AppResult<impl IntoResponse> {
    let input = input.map(|Json(input)| input).unwrap_or_default();
    let admitted =
        admission::start_job(&state.pool, &state.supervisor, auth.user_id, dream_id, &input)
            .await
            .inspect_err(|e| {
                tracing::info!(dream_id, user_id = auth.user_id, error = %e, "Generation refused");
            })?;

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: admitted })))
}
