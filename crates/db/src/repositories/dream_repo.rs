//! Repository for the `dreams` table.

use sqlx::PgPool;
use sublym_core::types::DbId;

use crate::models::dream::{CreateDream, Dream, UpdateDream};
use crate::models::status::DreamStatus;

const COLUMNS: &str = "\
    id, user_id, description, reject, photo_ids, status_id, last_run_id, \
    created_at, updated_at";

pub struct DreamRepo;

impl DreamRepo {
    /// Create a dream in `draft`.
    pub async fn create(
        pool: &PgPool,
        user_id: DbId,
        input: &CreateDream,
    ) -> Result<Dream, sqlx::Error> {
        let query = format!(
            "INSERT INTO dreams (user_id, description, reject, photo_ids, status_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Dream>(&query)
            .bind(user_id)
            .bind(&input.description)
            .bind(&input.reject)
            .bind(&input.photo_ids)
            .bind(DreamStatus::Draft.id())
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Dream>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM dreams WHERE id = $1");
        sqlx::query_as::<_, Dream>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a dream only if it belongs to `user_id`.
    pub async fn find_for_user(
        pool: &PgPool,
        id: DbId,
        user_id: DbId,
    ) -> Result<Option<Dream>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM dreams WHERE id = $1 AND user_id = $2");
        sqlx::query_as::<_, Dream>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's dreams, newest first.
    pub async fn list_by_user(pool: &PgPool, user_id: DbId) -> Result<Vec<Dream>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM dreams WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, Dream>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Patch a dream. Returns `None` if it does not exist or is processing.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateDream,
    ) -> Result<Option<Dream>, sqlx::Error> {
        let query = format!(
            "UPDATE dreams SET \
                 description = COALESCE($2, description), \
                 reject = COALESCE($3, reject), \
                 photo_ids = COALESCE($4, photo_ids), \
                 updated_at = NOW() \
             WHERE id = $1 AND status_id <> $5 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Dream>(&query)
            .bind(id)
            .bind(&input.description)
            .bind(&input.reject)
            .bind(&input.photo_ids)
            .bind(DreamStatus::Processing.id())
            .fetch_optional(pool)
            .await
    }

    /// Flip a dream to `processing` unless it already is.
    ///
    /// Returns `false` when another attempt got there first.
    pub async fn mark_processing(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE dreams SET status_id = $2, updated_at = NOW() \
             WHERE id = $1 AND status_id = ANY($3)",
        )
        .bind(id)
        .bind(DreamStatus::Processing.id())
        .bind(DreamStatus::source_ids(DreamStatus::Processing))
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_last_run(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: DbId,
        run_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE dreams SET last_run_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(run_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Move a dream to `next` if its current status allows it.
    ///
    /// Returns `false` when the transition is not legal from the stored status.
    pub async fn transition(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: DbId,
        next: DreamStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE dreams SET status_id = $2, updated_at = NOW() \
             WHERE id = $1 AND status_id = ANY($3)",
        )
        .bind(id)
        .bind(next.id())
        .bind(DreamStatus::source_ids(next))
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
