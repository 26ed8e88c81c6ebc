use std::sync::Arc;

use sublym_pipeline::Supervisor;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: everything inside is behind an `Arc` or a pool handle.
#[derive(Clone)]
pub struct AppState {
    pub pool: sublym_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Launches and tracks generation workers. Also carries the pipeline
    /// configuration, the process registry and the event bus.
    pub supervisor: Supervisor,
}

impl AppState {
    /// Cost figures are only exposed outside production.
    pub fn include_cost(&self) -> bool {
        !self.config.is_production()
    }
}
