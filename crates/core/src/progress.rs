//! Worker stdout protocol and progress arithmetic.
//!
//! The worker reports progress by printing one JSON object per line on
//! stdout. Lines are classified into a [`WorkerLine`]; anything that does
//! not conform is ignored rather than failing the job.
//!
//! The same progress payload is mirrored into a side-channel file
//! ([`ProgressSnapshot`]) so pollers can read it without a store round-trip.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Timestamp;

/// Lowest and highest progress values.
pub const MIN_PROGRESS: i16 = 0;
pub const MAX_PROGRESS: i16 = 100;

/// Step name written to the side-channel file before the worker starts.
pub const STEP_STARTING: &str = "starting";

// ---------------------------------------------------------------------------
// Stdout protocol
// ---------------------------------------------------------------------------

/// A progress event reported by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Percentage, clamped to `0..=100`.
    pub progress: i16,
    pub step: Option<String>,
    pub message: Option<String>,
}

/// One classified line of worker stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerLine {
    /// `{"progress": <number>, "step": ..., "message": ...}`
    Progress(ProgressUpdate),
    /// `{"error": "..."}` without a progress field.
    Error(String),
    /// Anything else. Logged by the caller, never interpreted.
    Unrecognized,
}

/// Classify a single stdout line.
pub fn parse_worker_line(line: &str) -> WorkerLine {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return WorkerLine::Unrecognized;
    }
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) else {
        return WorkerLine::Unrecognized;
    };

    if let Some(raw) = map.get("progress").and_then(Value::as_f64) {
        return WorkerLine::Progress(ProgressUpdate {
            progress: clamp_progress(raw),
            step: map.get("step").and_then(Value::as_str).map(str::to_owned),
            message: map.get("message").and_then(Value::as_str).map(str::to_owned),
        });
    }

    match map.get("error").and_then(Value::as_str) {
        Some(error) => WorkerLine::Error(error.to_owned()),
        None => WorkerLine::Unrecognized,
    }
}

/// Round and clamp a raw progress number into `0..=100`.
pub fn clamp_progress(raw: f64) -> i16 {
    if raw.is_nan() {
        return MIN_PROGRESS;
    }
    raw.round()
        .clamp(f64::from(MIN_PROGRESS), f64::from(MAX_PROGRESS)) as i16
}

/// Progress never moves backwards while a run is generating.
pub fn monotonic_progress(current: i16, incoming: i16) -> i16 {
    current.max(incoming)
}

// ---------------------------------------------------------------------------
// Time remaining
// ---------------------------------------------------------------------------

/// Linear extrapolation of the remaining time in seconds.
///
/// `max(0, round(elapsed / progress * 100 - elapsed))`. Returns `None` when
/// no progress has been made yet, since the estimate is meaningless there.
pub fn estimate_remaining_secs(elapsed_secs: f64, progress: i16) -> Option<i64> {
    if progress <= 0 {
        return None;
    }
    let elapsed = elapsed_secs.max(0.0);
    let total = elapsed / f64::from(progress) * 100.0;
    Some((total - elapsed).round().max(0.0) as i64)
}

// ---------------------------------------------------------------------------
// Side-channel file payload
// ---------------------------------------------------------------------------

/// Contents of the progress side-channel file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub progress: i16,
    pub step: Option<String>,
    pub message: Option<String>,
    pub updated_at: Timestamp,
}

impl ProgressSnapshot {
    /// The "starting" state written before the worker is spawned.
    pub fn starting(now: Timestamp) -> Self {
        Self {
            progress: MIN_PROGRESS,
            step: Some(STEP_STARTING.to_string()),
            message: Some("Starting generation".to_string()),
            updated_at: now,
        }
    }

    pub fn from_update(update: &ProgressUpdate, now: Timestamp) -> Self {
        Self {
            progress: update.progress,
            step: update.step.clone(),
            message: update.message.clone(),
            updated_at: now,
        }
    }
}
