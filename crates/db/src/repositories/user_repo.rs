//! Repository for the `users` table and its quota counters.

use sqlx::PgPool;
use sublym_core::quota::QuotaCounters;
use sublym_core::types::DbId;

use crate::models::user::{CreateUser, User};

/// Column list for `users` queries.
const COLUMNS: &str = "\
    id, email, first_name, gender, \
    free_generations, subscription_level, subscription_ends_at, \
    generations_used_this_month, generations_reset_at, total_generations, \
    created_at, updated_at";

pub struct UserRepo;

impl UserRepo {
    pub async fn create(pool: &PgPool, input: &CreateUser) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users \
                 (email, first_name, gender, free_generations, subscription_level, subscription_ends_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(&input.email)
            .bind(&input.first_name)
            .bind(&input.gender)
            .bind(input.free_generations)
            .bind(input.subscription_level)
            .bind(input.subscription_ends_at)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Read a user and hold a row lock until the transaction ends.
    ///
    /// Every read-modify-write of the quota counters goes through this so
    /// concurrent admissions for the same user serialize.
    pub async fn lock_for_update(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: DbId,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Write back the mutable quota counters.
    pub async fn save_quota(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: DbId,
        quota: &QuotaCounters,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET \
                 free_generations = $2, \
                 generations_used_this_month = $3, \
                 generations_reset_at = $4, \
                 total_generations = $5, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(quota.free_generations)
        .bind(quota.generations_used_this_month)
        .bind(quota.generations_reset_at)
        .bind(quota.total_generations)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
