//! Live-tunable generation configuration rows.

use serde::Serialize;
use sqlx::FromRow;

/// A row from the `scene_types` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct SceneType {
    pub code: String,
    pub description: String,
    pub min_ratio: f64,
    pub max_ratio: f64,
    pub examples: serde_json::Value,
}

/// A row from the `prompt_templates` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct PromptTemplate {
    pub code: String,
    pub template: String,
}
