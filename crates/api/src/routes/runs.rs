//! Route definitions for the `/runs` resource, addressed by trace id.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::runs;
use crate::state::AppState;

/// Routes mounted at `/runs`.
///
/// ```text
/// GET    /{trace_id}          -> get_run_status
/// POST   /{trace_id}/cancel   -> cancel_run
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{trace_id}", get(runs::get_run_status))
        .route("/{trace_id}/cancel", post(runs::cancel_run))
}
