//! Persistence seam used by the supervisor and completion handler.
//!
//! The supervisor only needs four state changes. Each returns whether it
//! was applied; `false` means the run had already moved on (typically a
//! cancel that won the race) and the caller must not publish anything.

use async_trait::async_trait;
use sqlx::PgPool;
use sublym_core::progress::ProgressUpdate;
use sublym_core::types::DbId;
use sublym_db::models::run::RunCompletion;
use sublym_db::repositories::RunRepo;

#[async_trait]
pub trait RunStore: Send + Sync {
    /// `pending -> generating`.
    async fn mark_generating(&self, run_id: DbId) -> Result<bool, sqlx::Error>;

    /// Monotonic progress write, applied only while generating.
    async fn update_progress(
        &self,
        run_id: DbId,
        update: &ProgressUpdate,
    ) -> Result<bool, sqlx::Error>;

    /// `generating -> completed`, cascading the dream.
    async fn complete(&self, run_id: DbId, completion: &RunCompletion)
        -> Result<bool, sqlx::Error>;

    /// Active `-> failed`, cascading the dream.
    async fn fail(&self, run_id: DbId, message: &str, retryable: bool)
        -> Result<bool, sqlx::Error>;
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn mark_generating(&self, run_id: DbId) -> Result<bool, sqlx::Error> {
        RunRepo::mark_generating(&self.pool, run_id).await
    }

    async fn update_progress(
        &self,
        run_id: DbId,
        update: &ProgressUpdate,
    ) -> Result<bool, sqlx::Error> {
        RunRepo::update_progress(&self.pool, run_id, update).await
    }

    async fn complete(
        &self,
        run_id: DbId,
        completion: &RunCompletion,
    ) -> Result<bool, sqlx::Error> {
        Ok(RunRepo::complete(&self.pool, run_id, completion)
            .await?
            .is_some())
    }

    async fn fail(&self, run_id: DbId, message: &str, retryable: bool) -> Result<bool, sqlx::Error> {
        Ok(RunRepo::fail(&self.pool, run_id, message, retryable)
            .await?
            .is_some())
    }
}
