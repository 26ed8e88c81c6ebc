//! Handlers for the `/runs` resource.
//!
//! Runs are addressed by trace id and scoped to the caller.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use sublym_pipeline::{cancel, status};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/runs/{trace_id}
///
/// Poll a run. While generating, progress comes from the side-channel file
/// when it is readable.
pub async fn get_run_status(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(trace_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let view = status::get_status(
        &state.pool,
        state.supervisor.config(),
        auth.user_id,
        &trace_id,
        state.include_cost(),
    )
    .await?;

    Ok(Json(DataResponse { data: view }))
}

/// POST /api/v1/runs/{trace_id}/cancel
///
/// Cancel a pending or generating run, refund its quota and put the dream
/// back into `draft`. 409 if the run is already finished.
pub async fn cancel_run(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(trace_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let run = cancel::cancel_run(
        &state.pool,
        state.supervisor.registry(),
        auth.user_id,
        &trace_id,
    )
    .await?;

    let view = status::build_view(&run, None, Utc::now(), state.include_cost());
    Ok(Json(DataResponse { data: view }))
}
