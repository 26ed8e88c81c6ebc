//! Repository for the `photos` table.

use sqlx::PgPool;
use sublym_core::types::DbId;

use crate::models::photo::Photo;

const COLUMNS: &str = "id, user_id, file_path, verified, created_at";

pub struct PhotoRepo;

impl PhotoRepo {
    pub async fn create(
        pool: &PgPool,
        user_id: DbId,
        file_path: &str,
        verified: bool,
    ) -> Result<Photo, sqlx::Error> {
        let query = format!(
            "INSERT INTO photos (user_id, file_path, verified) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Photo>(&query)
            .bind(user_id)
            .bind(file_path)
            .bind(verified)
            .fetch_one(pool)
            .await
    }

    /// Fetch the given photos that belong to `user_id`, in id order.
    ///
    /// Ids owned by another user are silently absent from the result; the
    /// caller compares lengths to detect them.
    pub async fn find_for_user(
        pool: &PgPool,
        user_id: DbId,
        ids: &[DbId],
    ) -> Result<Vec<Photo>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM photos \
             WHERE user_id = $1 AND id = ANY($2) \
             ORDER BY id"
        );
        sqlx::query_as::<_, Photo>(&query)
            .bind(user_id)
            .bind(ids)
            .fetch_all(pool)
            .await
    }
}
