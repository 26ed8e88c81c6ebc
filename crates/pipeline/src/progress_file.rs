//! Progress side-channel file.
//!
//! Advisory copy of the run's progress, written in the job directory so
//! pollers can read it without a database round-trip. Writes go through a
//! temporary file and a rename so a reader never observes a half-written
//! document.

use std::io;
use std::path::{Path, PathBuf};

use sublym_core::progress::ProgressSnapshot;

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replace the side-channel file with `snapshot`.
pub async fn write(path: &Path, snapshot: &ProgressSnapshot) -> io::Result<()> {
    let bytes = serde_json::to_vec(snapshot)?;
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

/// Read the side-channel file. Missing or unparseable files yield `None`.
pub async fn read(path: &Path) -> Option<ProgressSnapshot> {
    let bytes = tokio::fs::read(path).await.ok()?;
    serde_json::from_slice(&bytes).ok()
}
