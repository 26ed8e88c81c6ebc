//! Repository for the `runs` table.
//!
//! Every state change is a conditional update keyed on the current status,
//! so a transition that lost a race (for example a completion arriving after
//! a cancel) affects no rows and is reported as `None`/`false` instead of
//! overwriting a terminal run. Terminal transitions cascade to the owning
//! dream inside the same transaction.

use sqlx::PgPool;
use sublym_core::progress::{ProgressUpdate, MAX_PROGRESS};
use sublym_core::types::DbId;

use crate::models::run::{NewRun, Run, RunCompletion};
use crate::models::status::{DreamStatus, RunStatus};

/// Column list for `runs` queries.
const COLUMNS: &str = "\
    id, trace_id, dream_id, user_id, status_id, \
    progress, current_step, step_message, \
    photos_only, used_free_credit, scenes_count, \
    video_path, preview_path, keyframes_zip_path, \
    scenes_generated, duration_secs, cost_eur, cost_details, \
    error_message, retryable, \
    created_at, started_at, completed_at, updated_at";

pub struct RunRepo;

impl RunRepo {
    /// Insert a `pending` run inside the admission transaction.
    pub async fn create(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        input: &NewRun,
    ) -> Result<Run, sqlx::Error> {
        let query = format!(
            "INSERT INTO runs \
                 (trace_id, dream_id, user_id, status_id, photos_only, used_free_credit, scenes_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Run>(&query)
            .bind(&input.trace_id)
            .bind(input.dream_id)
            .bind(input.user_id)
            .bind(RunStatus::Pending.id())
            .bind(input.photos_only)
            .bind(input.used_free_credit)
            .bind(input.scenes_count)
            .fetch_one(&mut **tx)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Run>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM runs WHERE id = $1");
        sqlx::query_as::<_, Run>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_trace_id(
        pool: &PgPool,
        trace_id: &str,
    ) -> Result<Option<Run>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM runs WHERE trace_id = $1");
        sqlx::query_as::<_, Run>(&query)
            .bind(trace_id)
            .fetch_optional(pool)
            .await
    }

    /// All attempts of a dream, newest first.
    pub async fn list_by_dream(pool: &PgPool, dream_id: DbId) -> Result<Vec<Run>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM runs WHERE dream_id = $1 ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, Run>(&query)
            .bind(dream_id)
            .fetch_all(pool)
            .await
    }

    /// `pending -> generating`, stamped immediately before the worker spawns.
    pub async fn mark_generating(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE runs SET status_id = $2, started_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = ANY($3)",
        )
        .bind(id)
        .bind(RunStatus::Generating.id())
        .bind(RunStatus::source_ids(RunStatus::Generating))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Apply a progress event. The stored percentage never decreases and
    /// nothing is written unless the run is generating.
    pub async fn update_progress(
        pool: &PgPool,
        id: DbId,
        update: &ProgressUpdate,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE runs SET \
                 progress = GREATEST(progress, $2), \
                 current_step = COALESCE($3, current_step), \
                 step_message = COALESCE($4, step_message), \
                 updated_at = NOW() \
             WHERE id = $1 AND status_id = $5",
        )
        .bind(id)
        .bind(update.progress)
        .bind(&update.step)
        .bind(&update.message)
        .bind(RunStatus::Generating.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `generating -> completed` with the result fields, cascading the dream.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        completion: &RunCompletion,
    ) -> Result<Option<Run>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE runs SET \
                 status_id = $2, progress = $3, \
                 video_path = $4, preview_path = $5, keyframes_zip_path = $6, \
                 scenes_generated = $7, duration_secs = $8, \
                 cost_eur = $9, cost_details = $10, \
                 error_message = NULL, retryable = false, \
                 completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = ANY($11) \
             RETURNING {COLUMNS}"
        );
        let run = sqlx::query_as::<_, Run>(&query)
            .bind(id)
            .bind(RunStatus::Completed.id())
            .bind(MAX_PROGRESS)
            .bind(&completion.video_path)
            .bind(&completion.preview_path)
            .bind(&completion.keyframes_zip_path)
            .bind(completion.scenes_generated)
            .bind(completion.duration_secs)
            .bind(completion.cost_eur)
            .bind(&completion.cost_details)
            .bind(RunStatus::source_ids(RunStatus::Completed))
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(run) = &run {
            cascade_dream(&mut tx, run.dream_id, RunStatus::Completed).await?;
        }

        tx.commit().await?;
        Ok(run)
    }

    /// Any active state `-> failed`, cascading the dream.
    pub async fn fail(
        pool: &PgPool,
        id: DbId,
        message: &str,
        retryable: bool,
    ) -> Result<Option<Run>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let run = fail_active(&mut tx, id, message, retryable).await?;
        if let Some(run) = &run {
            cascade_dream(&mut tx, run.dream_id, RunStatus::Failed).await?;
        }
        tx.commit().await?;
        Ok(run)
    }

    /// Fail an active run inside a caller-owned transaction without touching
    /// the dream. Used by cancellation, which returns the dream to `draft`
    /// instead of cascading.
    pub async fn fail_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: DbId,
        message: &str,
        retryable: bool,
    ) -> Result<Option<Run>, sqlx::Error> {
        fail_active(tx, id, message, retryable).await
    }
}

async fn fail_active(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: DbId,
    message: &str,
    retryable: bool,
) -> Result<Option<Run>, sqlx::Error> {
    let query = format!(
        "UPDATE runs SET \
             status_id = $2, error_message = $3, retryable = $4, \
             completed_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND status_id = ANY($5) \
         RETURNING {COLUMNS}"
    );
    sqlx::query_as::<_, Run>(&query)
        .bind(id)
        .bind(RunStatus::Failed.id())
        .bind(message)
        .bind(retryable)
        .bind(RunStatus::source_ids(RunStatus::Failed))
        .fetch_optional(&mut **tx)
        .await
}

async fn cascade_dream(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    dream_id: DbId,
    terminal: RunStatus,
) -> Result<(), sqlx::Error> {
    let Some(status) = terminal.cascaded_dream_status() else {
        return Ok(());
    };
    sqlx::query(
        "UPDATE dreams SET status_id = $2, updated_at = NOW() WHERE id = $1 AND status_id = ANY($3)",
    )
    .bind(dream_id)
    .bind(status.id())
    .bind(DreamStatus::source_ids(status))
    .execute(&mut **tx)
    .await?;
    Ok(())
}
