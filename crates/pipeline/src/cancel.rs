//! User-initiated cancellation.
//!
//! In one transaction the run is failed (retryable, so the user can try
//! again), the dream goes back to `draft` and the consumption is refunded.
//! The live worker, if any, is then signalled through the process registry
//! and killed by its supervisor.

use sqlx::PgPool;
use sublym_core::error::CoreError;
use sublym_core::quota::refund_consumption;
use sublym_core::types::DbId;
use sublym_db::models::run::Run;
use sublym_db::models::status::DreamStatus;
use sublym_db::repositories::{DreamRepo, RunRepo, UserRepo};

use crate::error::PipelineError;
use crate::registry::ProcessRegistry;

pub const CANCELLED_MESSAGE: &str = "Generation cancelled by user";

/// Cancel the caller's run identified by `trace_id`.
///
/// Fails with `Conflict` unless the run is pending or generating.
pub async fn cancel_run(
    pool: &PgPool,
    registry: &ProcessRegistry,
    user_id: DbId,
    trace_id: &str,
) -> Result<Run, PipelineError> {
    let run = RunRepo::find_by_trace_id(pool, trace_id)
        .await?
        .filter(|run| run.user_id == user_id)
        .ok_or_else(|| CoreError::NotFoundByKey {
            entity: "Run",
            key: trace_id.to_string(),
        })?;

    let mut tx = pool.begin().await?;

    // Same lock order as admission: user row first.
    let user = UserRepo::lock_for_update(&mut tx, user_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "User",
            id: user_id,
        })?;

    let Some(cancelled) = RunRepo::fail_in_tx(&mut tx, run.id, CANCELLED_MESSAGE, true).await?
    else {
        return Err(CoreError::Conflict("Run is not in progress".to_string()).into());
    };

    if !DreamRepo::transition(&mut tx, cancelled.dream_id, DreamStatus::Draft).await? {
        tracing::warn!(trace_id, dream_id = cancelled.dream_id, "Dream was not processing at cancel time");
    }

    let mut quota = user.quota();
    refund_consumption(&mut quota, cancelled.used_free_credit);
    UserRepo::save_quota(&mut tx, user_id, &quota).await?;

    tx.commit().await?;

    let signalled = registry.cancel(trace_id);
    tracing::info!(
        trace_id,
        run_id = cancelled.id,
        dream_id = cancelled.dream_id,
        user_id,
        worker_signalled = signalled,
        "Run cancelled",
    );

    Ok(cancelled)
}
