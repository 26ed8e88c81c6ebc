//! Per-run worker supervision.
//!
//! [`Supervisor::spawn`] detaches one task per admitted run. The task
//! prepares the job directory, launches the worker, streams its stdout
//! through the progress protocol, collects stderr, and races process exit
//! against the wall-clock timeout and the cancellation token. Whatever
//! happens, the run ends in a terminal state: failures are recorded on the
//! run, never returned to the caller that admitted it.
//!
//! Supervised runs are independent. There is no queue and no concurrency
//! cap; admission control bounds the number of live workers.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sublym_core::artifacts::{
    JobLayout, OutputShape, KEYFRAMES_ARCHIVE_FILE, KEYFRAMES_DIR, MANIFEST_FILE, PREVIEW_FILE,
    VIDEO_FILE,
};
use sublym_core::progress::{
    monotonic_progress, parse_worker_line, ProgressSnapshot, WorkerLine,
};
use sublym_core::types::DbId;
use sublym_events::bus::{RUN_COMPLETED, RUN_FAILED};
use sublym_events::{EventBus, RunEvent};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::task::JoinHandle;

use crate::completion;
use crate::config::PipelineConfig;
use crate::progress_file;
use crate::registry::ProcessRegistry;
use crate::store::RunStore;
use crate::worker::{build_command, GenerationConfigDocument, WorkerInput};

/// Maximum stderr retained as the failure message (64 KiB).
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// How long to wait for the output readers once the process is gone.
/// A grandchild holding the pipes open must not stall finalization.
const READER_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Recorded when supervision is interrupted by shutdown rather than a user.
pub const INTERRUPTED_MESSAGE: &str = "Generation was interrupted";

// ---------------------------------------------------------------------------
// Job and outcome
// ---------------------------------------------------------------------------

/// One admitted run, with everything the worker needs.
#[derive(Debug, Clone)]
pub struct SupervisedJob {
    pub run_id: DbId,
    pub trace_id: String,
    pub user_id: DbId,
    pub dream_id: DbId,
    pub shape: OutputShape,
    pub input: WorkerInput,
    pub generation_config: GenerationConfigDocument,
    pub timeout: Duration,
}

/// Terminal result of one supervision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisionOutcome {
    Completed,
    /// Non-zero exit, signal death, or a failure after a clean exit.
    Failed { message: String },
    TimedOut,
    /// The cancellation token fired, or the run left `pending` before the
    /// worker could be marked as generating.
    Cancelled,
    /// The worker never ran.
    SpawnFailed { message: String },
}

enum Exit {
    Exited(io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Failure text for a worker that exited unsuccessfully: stderr if any,
/// else the last `{"error": ...}` line, else a generic message.
pub fn failure_message(code: Option<i32>, stderr: &str, worker_error: Option<&str>) -> String {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    if let Some(error) = worker_error.map(str::trim).filter(|e| !e.is_empty()) {
        return error.to_string();
    }
    match code {
        Some(code) => format!("Worker exited with code {code}"),
        None => "Worker terminated by signal".to_string(),
    }
}

pub fn timeout_message(timeout: Duration) -> String {
    let secs = timeout.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        format!("Generation timed out after {} minutes", secs / 60)
    } else {
        format!("Generation timed out after {secs} seconds")
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Supervisor {
    store: Arc<dyn RunStore>,
    config: Arc<PipelineConfig>,
    registry: ProcessRegistry,
    events: Arc<EventBus>,
}

impl Supervisor {
    pub fn new(
        store: Arc<dyn RunStore>,
        config: Arc<PipelineConfig>,
        registry: ProcessRegistry,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            config,
            registry,
            events,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Supervise `job` on its own task.
    pub fn spawn(&self, job: SupervisedJob) -> JoinHandle<SupervisionOutcome> {
        let this = self.clone();
        tokio::spawn(async move { this.supervise(job).await })
    }

    /// Run one job to a terminal state.
    pub async fn supervise(&self, job: SupervisedJob) -> SupervisionOutcome {
        let layout = JobLayout::new(&self.config.storage_root, job.user_id, job.dream_id);

        if let Err(e) = prepare_job_dir(&layout, &job.generation_config).await {
            let message = format!("Failed to prepare working directory: {e}");
            tracing::error!(trace_id = %job.trace_id, run_id = job.run_id, error = %e, "Job directory setup failed");
            self.record_failure(&job, &message).await;
            return SupervisionOutcome::SpawnFailed { message };
        }

        let registration = self.registry.register(&job.trace_id);
        let mut cmd = build_command(&self.config, &job.input);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!("Failed to start generation worker: {e}");
                tracing::error!(
                    trace_id = %job.trace_id,
                    run_id = job.run_id,
                    program = %self.config.worker_program,
                    error = %e,
                    "Worker spawn failed",
                );
                self.record_failure(&job, &message).await;
                return SupervisionOutcome::SpawnFailed { message };
            }
        };

        match self.store.mark_generating(job.run_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(trace_id = %job.trace_id, run_id = job.run_id, "Run left pending before start, stopping worker");
                kill(&mut child).await;
                return SupervisionOutcome::Cancelled;
            }
            Err(e) => {
                tracing::error!(trace_id = %job.trace_id, run_id = job.run_id, error = %e, "Failed to mark run generating");
                kill(&mut child).await;
                let message = format!("Failed to record generation start: {e}");
                self.record_failure(&job, &message).await;
                return SupervisionOutcome::Failed { message };
            }
        }

        tracing::info!(
            trace_id = %job.trace_id,
            run_id = job.run_id,
            dream_id = job.dream_id,
            user_id = job.user_id,
            pid = child.id(),
            timeout_secs = job.timeout.as_secs(),
            "Worker started",
        );

        let stdout_task = child.stdout.take().map(|stdout| {
            tokio::spawn(pump_stdout(
                stdout,
                self.store.clone(),
                job.run_id,
                job.trace_id.clone(),
                layout.progress_path(),
            ))
        });
        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(collect_stderr(stderr)));

        let exit = tokio::select! {
            status = child.wait() => Exit::Exited(status),
            _ = tokio::time::sleep(job.timeout) => Exit::TimedOut,
            _ = registration.token().cancelled() => Exit::Cancelled,
        };
        if !matches!(exit, Exit::Exited(_)) {
            kill(&mut child).await;
        }

        let worker_error = drain(stdout_task).await;
        let stderr = drain(stderr_task).await;
        drop(registration);

        match exit {
            Exit::Exited(Ok(status)) if status.success() => self.finish_success(&job, &layout).await,
            Exit::Exited(Ok(status)) => {
                let message = failure_message(status.code(), &stderr, worker_error.as_deref());
                tracing::warn!(
                    trace_id = %job.trace_id,
                    run_id = job.run_id,
                    exit_code = status.code(),
                    error = %message,
                    "Worker failed",
                );
                self.record_failure(&job, &message).await;
                SupervisionOutcome::Failed { message }
            }
            Exit::Exited(Err(e)) => {
                let message = format!("Failed to wait for generation worker: {e}");
                tracing::error!(trace_id = %job.trace_id, run_id = job.run_id, error = %e, "Worker wait failed");
                self.record_failure(&job, &message).await;
                SupervisionOutcome::Failed { message }
            }
            Exit::TimedOut => {
                let message = timeout_message(job.timeout);
                tracing::warn!(trace_id = %job.trace_id, run_id = job.run_id, "Worker timed out and was killed");
                self.record_failure(&job, &message).await;
                SupervisionOutcome::TimedOut
            }
            Exit::Cancelled => {
                tracing::info!(trace_id = %job.trace_id, run_id = job.run_id, "Worker killed on cancellation");
                // A user cancel has already failed the run; shutdown has not.
                self.record_failure(&job, INTERRUPTED_MESSAGE).await;
                SupervisionOutcome::Cancelled
            }
        }
    }

    async fn finish_success(&self, job: &SupervisedJob, layout: &JobLayout) -> SupervisionOutcome {
        let requested_scenes = job.input.scenes_count;
        let completion = match completion::collect_results(layout, job.shape, requested_scenes).await {
            Ok(completion) => completion,
            Err(e) => {
                let message = format!("Failed to process generation results: {e}");
                tracing::error!(trace_id = %job.trace_id, run_id = job.run_id, error = %e, "Result processing failed");
                self.record_failure(job, &message).await;
                return SupervisionOutcome::Failed { message };
            }
        };

        match self.store.complete(job.run_id, &completion).await {
            Ok(true) => {
                tracing::info!(
                    trace_id = %job.trace_id,
                    run_id = job.run_id,
                    scenes = completion.scenes_generated,
                    duration_secs = completion.duration_secs,
                    "Run completed",
                );
                self.events.publish(
                    self.event(job, RUN_COMPLETED).with_payload(serde_json::json!({
                        "video_path": completion.video_path,
                        "preview_path": completion.preview_path,
                        "keyframes_zip_path": completion.keyframes_zip_path,
                    })),
                );
                SupervisionOutcome::Completed
            }
            Ok(false) => {
                tracing::info!(trace_id = %job.trace_id, run_id = job.run_id, "Run no longer generating, results discarded");
                SupervisionOutcome::Cancelled
            }
            Err(e) => {
                let message = format!("Failed to record generation results: {e}");
                tracing::error!(trace_id = %job.trace_id, run_id = job.run_id, error = %e, "Completion write failed");
                self.record_failure(job, &message).await;
                SupervisionOutcome::Failed { message }
            }
        }
    }

    /// Fail the run (retryable) and publish `run.failed` if the write applied.
    async fn record_failure(&self, job: &SupervisedJob, message: &str) {
        match self.store.fail(job.run_id, message, true).await {
            Ok(true) => {
                self.events.publish(
                    self.event(job, RUN_FAILED)
                        .with_payload(serde_json::json!({ "error_message": message })),
                );
            }
            Ok(false) => {
                tracing::debug!(trace_id = %job.trace_id, run_id = job.run_id, "Run already terminal, failure not recorded");
            }
            Err(e) => {
                tracing::error!(trace_id = %job.trace_id, run_id = job.run_id, error = %e, "Failed to record run failure");
            }
        }
    }

    fn event(&self, job: &SupervisedJob, event_type: &str) -> RunEvent {
        RunEvent::new(event_type, job.run_id, job.trace_id.clone(), job.dream_id, job.user_id)
    }
}

// ---------------------------------------------------------------------------
// Job directory
// ---------------------------------------------------------------------------

/// Create the job directory, clear outputs left by an earlier attempt of
/// the same dream, and write the worker's inputs.
async fn prepare_job_dir(layout: &JobLayout, config: &GenerationConfigDocument) -> io::Result<()> {
    let job_dir = layout.job_dir();
    tokio::fs::create_dir_all(&job_dir).await?;

    for file in [MANIFEST_FILE, KEYFRAMES_ARCHIVE_FILE, VIDEO_FILE, PREVIEW_FILE] {
        remove_if_present(tokio::fs::remove_file(job_dir.join(file)).await)?;
    }
    remove_if_present(tokio::fs::remove_dir_all(job_dir.join(KEYFRAMES_DIR)).await)?;

    let document = serde_json::to_vec_pretty(config)?;
    tokio::fs::write(layout.generation_config_path(), document).await?;

    progress_file::write(&layout.progress_path(), &ProgressSnapshot::starting(Utc::now())).await
}

fn remove_if_present(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Process I/O
// ---------------------------------------------------------------------------

async fn kill(child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "Failed to kill worker process");
    }
}

/// Wait for a reader task, giving up after [`READER_DRAIN_GRACE`].
async fn drain<T: Default>(task: Option<JoinHandle<T>>) -> T {
    let Some(mut task) = task else {
        return T::default();
    };
    match tokio::time::timeout(READER_DRAIN_GRACE, &mut task).await {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Worker output reader panicked");
            T::default()
        }
        Err(_) => {
            task.abort();
            tracing::warn!("Worker output still open after exit, reader abandoned");
            T::default()
        }
    }
}

/// Apply the stdout protocol line by line. Returns the last worker error
/// report, if any.
async fn pump_stdout(
    stdout: ChildStdout,
    store: Arc<dyn RunStore>,
    run_id: DbId,
    trace_id: String,
    progress_path: PathBuf,
) -> Option<String> {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    let mut last_error = None;
    let mut high_water = 0;
    // Set once the store refuses progress: the run is no longer generating
    // and the progress file may already belong to a newer attempt.
    let mut detached = false;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(trace_id = %trace_id, error = %e, "Failed to read worker stdout");
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf);

        match parse_worker_line(&line) {
            WorkerLine::Progress(_) if detached => {}
            WorkerLine::Progress(mut update) => {
                high_water = monotonic_progress(high_water, update.progress);
                update.progress = high_water;

                match store.update_progress(run_id, &update).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::info!(trace_id = %trace_id, run_id, "Run no longer generating, ignoring further progress");
                        detached = true;
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(trace_id = %trace_id, run_id, error = %e, "Failed to store progress");
                    }
                }
                let snapshot = ProgressSnapshot::from_update(&update, Utc::now());
                if let Err(e) = progress_file::write(&progress_path, &snapshot).await {
                    tracing::warn!(trace_id = %trace_id, error = %e, "Failed to write progress file");
                }
                tracing::debug!(
                    trace_id = %trace_id,
                    progress = update.progress,
                    step = update.step.as_deref().unwrap_or_default(),
                    "Worker progress",
                );
            }
            WorkerLine::Error(error) => {
                tracing::warn!(trace_id = %trace_id, error = %error, "Worker reported an error");
                last_error = Some(error);
            }
            WorkerLine::Unrecognized => {
                let text = line.trim_end();
                if !text.is_empty() {
                    tracing::debug!(trace_id = %trace_id, line = %text, "Worker output");
                }
            }
        }
    }

    last_error
}

/// Read stderr to the end, keeping the first [`MAX_STDERR_BYTES`]. The rest
/// is drained so the worker never blocks on a full pipe.
async fn collect_stderr(stderr: ChildStderr) -> String {
    String::from_utf8_lossy(&read_capped(stderr, MAX_STDERR_BYTES).await).into_owned()
}

async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, cap: usize) -> Vec<u8> {
    let mut kept = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = cap.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
    kept
}
