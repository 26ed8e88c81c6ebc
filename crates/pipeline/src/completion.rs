//! Result collection after a successful worker exit.
//!
//! Reads the manifest, derives the artifact paths for the run's output
//! shape and, for image-set runs, packages the keyframes. Anything that goes
//! wrong here fails the run even though the worker exited cleanly.

use sublym_core::artifacts::{JobLayout, OutputShape};
use sublym_core::manifest::{ManifestError, RunManifest};
use sublym_db::models::run::RunCompletion;

use crate::archive::{self, ArchiveError};

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Result processing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Build the completion record for a run whose worker exited 0.
///
/// `requested_scenes` is the scene count the worker was asked for, used
/// when the manifest does not report one.
pub async fn collect_results(
    layout: &JobLayout,
    shape: OutputShape,
    requested_scenes: i32,
) -> Result<RunCompletion, CompletionError> {
    let manifest_path = layout.manifest_path();
    let manifest = tokio::task::spawn_blocking(move || RunManifest::load(&manifest_path)).await??;
    let resolved = manifest.resolve(requested_scenes);

    if shape == OutputShape::ImageSet {
        let source = layout.keyframes_dir();
        let dest = layout.archive_path();
        let count =
            tokio::task::spawn_blocking(move || archive::zip_directory(&source, &dest)).await??;
        tracing::debug!(files = count, archive = %layout.archive_path().display(), "Keyframes archived");
    }

    let artifacts = layout.artifacts(shape);
    Ok(RunCompletion {
        video_path: artifacts.video_path,
        preview_path: artifacts.preview_path,
        keyframes_zip_path: artifacts.keyframes_zip_path,
        scenes_generated: resolved.scenes_count,
        duration_secs: resolved.duration_secs,
        cost_eur: resolved.cost_eur,
        cost_details: resolved.cost_details,
    })
}
