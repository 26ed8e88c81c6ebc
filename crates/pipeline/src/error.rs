//! Error type for orchestration operations invoked synchronously by callers.
//!
//! Worker-side failures never surface here: the supervisor records them on
//! the run instead.

use sublym_core::error::CoreError;
use sublym_core::quota::RejectionReason;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Admission denied by the quota ledger or a feature gate.
    #[error("{0}")]
    Rejected(RejectionReason),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RejectionReason> for PipelineError {
    fn from(reason: RejectionReason) -> Self {
        Self::Rejected(reason)
    }
}
