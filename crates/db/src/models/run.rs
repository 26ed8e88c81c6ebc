//! Run (execution attempt) models.

use serde::Serialize;
use sqlx::FromRow;
use sublym_core::types::{DbId, Timestamp};

use super::status::{RunStatus, StatusId};

/// A row from the `runs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Run {
    pub id: DbId,
    /// Public handle and correlation key for this attempt.
    pub trace_id: String,
    pub dream_id: DbId,
    pub user_id: DbId,
    pub status_id: StatusId,
    pub progress: i16,
    pub current_step: Option<String>,
    pub step_message: Option<String>,
    /// Output shape: image set when true, video otherwise.
    pub photos_only: bool,
    /// Whether admission consumed a free credit (drives the refund).
    pub used_free_credit: bool,
    /// Scene count requested from the worker.
    pub scenes_count: i32,
    pub video_path: Option<String>,
    pub preview_path: Option<String>,
    pub keyframes_zip_path: Option<String>,
    pub scenes_generated: Option<i32>,
    pub duration_secs: Option<f64>,
    pub cost_eur: Option<f64>,
    pub cost_details: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub retryable: bool,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl Run {
    pub fn status(&self) -> Option<RunStatus> {
        RunStatus::from_id(self.status_id)
    }
}

/// Insert payload for a new pending run.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub trace_id: String,
    pub dream_id: DbId,
    pub user_id: DbId,
    pub photos_only: bool,
    pub used_free_credit: bool,
    pub scenes_count: i32,
}

/// Result fields written when a run completes.
#[derive(Debug, Clone, PartialEq)]
pub struct RunCompletion {
    pub video_path: Option<String>,
    pub preview_path: Option<String>,
    pub keyframes_zip_path: Option<String>,
    pub scenes_generated: i32,
    pub duration_secs: f64,
    pub cost_eur: f64,
    pub cost_details: serde_json::Value,
}
