//! Route definitions for the `/dreams` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::dreams;
use crate::state::AppState;

/// Routes mounted at `/dreams`.
///
/// ```text
/// GET    /                -> list_dreams
/// POST   /                -> create_dream
/// GET    /{id}            -> get_dream
/// PUT    /{id}            -> update_dream
/// POST   /{id}/generate   -> generate
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(dreams::list_dreams).post(dreams::create_dream))
        .route("/{id}", get(dreams::get_dream).put(dreams::update_dream))
        .route("/{id}/generate", post(dreams::generate))
}
