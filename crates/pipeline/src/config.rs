//! Pipeline configuration.
//!
//! Two layers:
//! - [`PipelineConfig`]: deployment settings from environment variables,
//!   loaded once at startup.
//! - [`GenerationSettings`]: live-tunable settings from the configuration
//!   tables, read fresh for every job so they can change without a redeploy.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::PgPool;
use sublym_db::models::generation_setting::{PromptTemplate, SceneType};
use sublym_db::repositories::GenerationSettingRepo;

/// Default wall-clock budget for one worker run.
pub const DEFAULT_WORKER_TIMEOUT_MINUTES: u64 = 25;

/// Largest stored timeout accepted from the settings table (one day).
pub const MAX_WORKER_TIMEOUT_MINUTES: u64 = 24 * 60;

/// Default scene and keyframe counts requested from the worker.
pub const DEFAULT_SCENES_COUNT: i32 = 4;
pub const DEFAULT_KEYFRAMES_COUNT: i32 = 4;

/// Default retry budgets for the worker's own internal logic.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_MAX_VIDEO_ATTEMPTS: u32 = 4;

// ---------------------------------------------------------------------------
// Deployment configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root under which every job gets its working directory.
    pub storage_root: PathBuf,
    /// Executable launched for each job.
    pub worker_program: String,
    /// Script passed as the first argument to `worker_program`, if any.
    pub worker_script: Option<PathBuf>,
    /// Timeout used when the settings table has no override.
    pub worker_timeout_minutes: u64,
    pub default_scenes_count: i32,
    pub default_keyframes_count: i32,
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                       |
    /// |--------------------------|-------------------------------|
    /// | `STORAGE_ROOT`           | `./storage`                   |
    /// | `WORKER_PROGRAM`         | `python3`                     |
    /// | `WORKER_SCRIPT`          | `scripts/dream_generate.py`   |
    /// | `WORKER_TIMEOUT_MINUTES` | `25`                          |
    /// | `DEFAULT_SCENES_COUNT`   | `4`                           |
    /// | `DEFAULT_KEYFRAMES_COUNT`| `4`                           |
    ///
    /// An empty `WORKER_SCRIPT` runs `WORKER_PROGRAM` directly.
    pub fn from_env() -> Self {
        let storage_root = std::env::var("STORAGE_ROOT").unwrap_or_else(|_| "./storage".into());

        let worker_program = std::env::var("WORKER_PROGRAM").unwrap_or_else(|_| "python3".into());

        let worker_script = std::env::var("WORKER_SCRIPT")
            .unwrap_or_else(|_| "scripts/dream_generate.py".into());
        let worker_script = Some(worker_script.trim())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let worker_timeout_minutes: u64 = std::env::var("WORKER_TIMEOUT_MINUTES")
            .unwrap_or_else(|_| DEFAULT_WORKER_TIMEOUT_MINUTES.to_string())
            .parse()
            .expect("WORKER_TIMEOUT_MINUTES must be a valid u64");

        let default_scenes_count: i32 = std::env::var("DEFAULT_SCENES_COUNT")
            .unwrap_or_else(|_| DEFAULT_SCENES_COUNT.to_string())
            .parse()
            .expect("DEFAULT_SCENES_COUNT must be a valid i32");

        let default_keyframes_count: i32 = std::env::var("DEFAULT_KEYFRAMES_COUNT")
            .unwrap_or_else(|_| DEFAULT_KEYFRAMES_COUNT.to_string())
            .parse()
            .expect("DEFAULT_KEYFRAMES_COUNT must be a valid i32");

        Self {
            storage_root: PathBuf::from(storage_root),
            worker_program,
            worker_script,
            worker_timeout_minutes,
            default_scenes_count,
            default_keyframes_count,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-job settings
// ---------------------------------------------------------------------------

/// Keys of the `generation_settings` table.
pub mod keys {
    pub const WORKER_TIMEOUT_MINUTES: &str = "worker_timeout_minutes";
    pub const MAX_ATTEMPTS: &str = "max_attempts";
    pub const MAX_VIDEO_ATTEMPTS: &str = "max_video_attempts";
    pub const MODEL_SCENARIO: &str = "model_scenario";
    pub const MODEL_IMAGE: &str = "model_image";
    pub const MODEL_VIDEO: &str = "model_video";
    pub const SCENES_COUNT: &str = "scenes_count";
    pub const KEYFRAMES_COUNT: &str = "keyframes_count";
}

/// Settings snapshot taken when a job is admitted.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub worker_timeout_minutes: u64,
    pub max_attempts: u32,
    pub max_video_attempts: u32,
    pub model_scenario: Option<String>,
    pub model_image: Option<String>,
    pub model_video: Option<String>,
    pub scenes_count: i32,
    pub keyframes_count: i32,
    /// Active scene types keyed by code.
    pub scene_types: BTreeMap<String, SceneType>,
    /// Active prompt overrides keyed by code.
    pub prompts: BTreeMap<String, String>,
}

impl GenerationSettings {
    /// Read the configuration tables.
    pub async fn load(pool: &PgPool, config: &PipelineConfig) -> Result<Self, sqlx::Error> {
        let values = GenerationSettingRepo::load_all(pool).await?;
        let scene_types = GenerationSettingRepo::active_scene_types(pool).await?;
        let prompts = GenerationSettingRepo::active_prompts(pool).await?;
        Ok(Self::from_parts(config, &values, scene_types, prompts))
    }

    /// Combine stored values with deployment defaults. Values that are
    /// missing, blank or unparseable fall back to the default.
    pub fn from_parts(
        config: &PipelineConfig,
        values: &HashMap<String, String>,
        scene_types: Vec<SceneType>,
        prompts: Vec<PromptTemplate>,
    ) -> Self {
        Self {
            worker_timeout_minutes: parsed(values, keys::WORKER_TIMEOUT_MINUTES)
                .filter(|m| (1..=MAX_WORKER_TIMEOUT_MINUTES).contains(m))
                .unwrap_or(config.worker_timeout_minutes),
            max_attempts: parsed(values, keys::MAX_ATTEMPTS).unwrap_or(DEFAULT_MAX_ATTEMPTS),
            max_video_attempts: parsed(values, keys::MAX_VIDEO_ATTEMPTS)
                .unwrap_or(DEFAULT_MAX_VIDEO_ATTEMPTS),
            model_scenario: text(values, keys::MODEL_SCENARIO),
            model_image: text(values, keys::MODEL_IMAGE),
            model_video: text(values, keys::MODEL_VIDEO),
            scenes_count: parsed(values, keys::SCENES_COUNT)
                .filter(|n| *n > 0)
                .unwrap_or(config.default_scenes_count),
            keyframes_count: parsed(values, keys::KEYFRAMES_COUNT)
                .filter(|n| *n > 0)
                .unwrap_or(config.default_keyframes_count),
            scene_types: scene_types
                .into_iter()
                .map(|st| (st.code.clone(), st))
                .collect(),
            prompts: prompts.into_iter().map(|p| (p.code, p.template)).collect(),
        }
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_minutes.saturating_mul(60))
    }
}

fn text(values: &HashMap<String, String>, key: &str) -> Option<String> {
    values
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parsed<T: FromStr>(values: &HashMap<String, String>, key: &str) -> Option<T> {
    let raw = text(values, key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable generation setting");
            None
        }
    }
}
