//! The polled view of a run.
//!
//! The database row is authoritative. While the run is generating, the
//! progress side-channel file is preferred when it is readable, since the
//! worker's latest line reaches it without a store round-trip.

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use sublym_core::artifacts::JobLayout;
use sublym_core::error::CoreError;
use sublym_core::progress::{estimate_remaining_secs, ProgressSnapshot};
use sublym_core::types::{DbId, Timestamp};
use sublym_db::models::run::Run;
use sublym_db::models::status::RunStatus;
use sublym_db::repositories::RunRepo;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::progress_file;

/// URL prefix under which storage-relative artifact paths are served.
pub const MEDIA_URL_PREFIX: &str = "/media";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatusView {
    pub trace_id: String,
    pub status: RunStatus,
    pub progress: i16,
    pub current_step: Option<String>,
    pub step_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_remaining_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photos_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyframes_zip_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_eur: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

fn media_url(path: Option<&str>) -> Option<String> {
    path.map(|p| format!("{MEDIA_URL_PREFIX}/{}", p.trim_start_matches('/')))
}

/// Assemble the view. `snapshot` is the side-channel file content, consulted
/// only while generating. `include_cost` is false in production.
pub fn build_view(
    run: &Run,
    snapshot: Option<ProgressSnapshot>,
    now: Timestamp,
    include_cost: bool,
) -> RunStatusView {
    let status = run.status().unwrap_or(RunStatus::Pending);

    let (progress, current_step, step_message) = match snapshot {
        Some(s) if status == RunStatus::Generating => (s.progress, s.step, s.message),
        _ => (run.progress, run.current_step.clone(), run.step_message.clone()),
    };

    let mut view = RunStatusView {
        trace_id: run.trace_id.clone(),
        status,
        progress,
        current_step,
        step_message,
        estimated_remaining_secs: None,
        photos_only: None,
        video_url: None,
        preview_url: None,
        keyframes_zip_url: None,
        cost_eur: None,
        error_message: None,
        retryable: None,
        created_at: run.created_at,
        completed_at: run.completed_at,
    };

    match status {
        RunStatus::Generating => {
            let elapsed = (now - run.created_at).num_milliseconds() as f64 / 1000.0;
            view.estimated_remaining_secs = estimate_remaining_secs(elapsed, progress);
        }
        RunStatus::Completed => {
            view.photos_only = Some(run.photos_only);
            view.video_url = media_url(run.video_path.as_deref());
            view.preview_url = media_url(run.preview_path.as_deref());
            view.keyframes_zip_url = media_url(run.keyframes_zip_path.as_deref());
            if include_cost {
                view.cost_eur = run.cost_eur;
            }
        }
        RunStatus::Failed => {
            view.error_message = run.error_message.clone();
            view.retryable = Some(run.retryable);
        }
        RunStatus::Pending => {}
    }

    view
}

/// Poll the caller's run identified by `trace_id`.
pub async fn get_status(
    pool: &PgPool,
    config: &PipelineConfig,
    user_id: DbId,
    trace_id: &str,
    include_cost: bool,
) -> Result<RunStatusView, PipelineError> {
    let run = RunRepo::find_by_trace_id(pool, trace_id)
        .await?
        .filter(|run| run.user_id == user_id)
        .ok_or_else(|| CoreError::NotFoundByKey {
            entity: "Run",
            key: trace_id.to_string(),
        })?;

    let snapshot = if run.status() == Some(RunStatus::Generating) {
        let layout = JobLayout::new(&config.storage_root, run.user_id, run.dream_id);
        progress_file::read(&layout.progress_path()).await
    } else {
        None
    };

    Ok(build_view(&run, snapshot, Utc::now(), include_cost))
}
