//! Reads the live-tunable generation configuration tables.

use std::collections::HashMap;

use sqlx::PgPool;

use crate::models::generation_setting::{PromptTemplate, SceneType};

pub struct GenerationSettingRepo;

impl GenerationSettingRepo {
    /// All key/value settings.
    pub async fn load_all(pool: &PgPool) -> Result<HashMap<String, String>, sqlx::Error> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM generation_settings")
                .fetch_all(pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    /// Insert or overwrite one setting.
    pub async fn upsert(pool: &PgPool, key: &str, value: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO generation_settings (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
        )
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn active_scene_types(pool: &PgPool) -> Result<Vec<SceneType>, sqlx::Error> {
        sqlx::query_as::<_, SceneType>(
            "SELECT code, description, min_ratio, max_ratio, examples \
             FROM scene_types WHERE is_active ORDER BY sort_order, code",
        )
        .fetch_all(pool)
        .await
    }

    pub async fn active_prompts(pool: &PgPool) -> Result<Vec<PromptTemplate>, sqlx::Error> {
        sqlx::query_as::<_, PromptTemplate>(
            "SELECT code, template FROM prompt_templates WHERE is_active ORDER BY code",
        )
        .fetch_all(pool)
        .await
    }
}
