pub mod dreams;
pub mod health;
pub mod runs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /dreams                          list, create
/// /dreams/{id}                     get (with runs), update
/// /dreams/{id}/generate            start a generation (POST)
///
/// /runs/{trace_id}                 poll status
/// /runs/{trace_id}/cancel          cancel (POST)
/// ```
///
/// Every route requires a Bearer token.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/dreams", dreams::router())
        .nest("/runs", runs::router())
}
