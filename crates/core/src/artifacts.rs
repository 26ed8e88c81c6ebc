//! On-disk layout of a generation job and the artifact paths derived from it.
//!
//! Every job owns one working directory keyed by `(user, dream)`:
//!
//! ```text
//! <storage_root>/users/<user_id>/dreams/<dream_id>/
//!     generation_config.json   written before the worker starts
//!     progress.json            progress side-channel
//!     result.json              manifest written by the worker
//!     final.mp4                video output
//!     preview.jpg              preview image
//!     keyframes/               image-set output
//!     keyframes.zip            archive of keyframes/ (image-set jobs)
//! ```
//!
//! Paths stored on the run record are relative to the storage root so the
//! storage location can move without rewriting rows.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::DbId;

pub const GENERATION_CONFIG_FILE: &str = "generation_config.json";
pub const PROGRESS_FILE: &str = "progress.json";
pub const MANIFEST_FILE: &str = "result.json";
pub const VIDEO_FILE: &str = "final.mp4";
pub const PREVIEW_FILE: &str = "preview.jpg";
pub const KEYFRAMES_DIR: &str = "keyframes";
pub const KEYFRAMES_ARCHIVE_FILE: &str = "keyframes.zip";

/// Shape of the worker's output, decided by the subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputShape {
    /// A single video file plus a preview image.
    Video,
    /// A directory of keyframe images, delivered as one archive.
    ImageSet,
}

impl OutputShape {
    pub fn from_photos_only(photos_only: bool) -> Self {
        if photos_only {
            Self::ImageSet
        } else {
            Self::Video
        }
    }

    pub fn is_photos_only(self) -> bool {
        self == Self::ImageSet
    }
}

/// Storage-relative artifact locations recorded on a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub video_path: Option<String>,
    pub preview_path: Option<String>,
    pub keyframes_zip_path: Option<String>,
}

/// Filesystem layout of one `(user, dream)` job.
#[derive(Debug, Clone)]
pub struct JobLayout {
    storage_root: PathBuf,
    user_id: DbId,
    dream_id: DbId,
}

impl JobLayout {
    pub fn new(storage_root: impl Into<PathBuf>, user_id: DbId, dream_id: DbId) -> Self {
        Self {
            storage_root: storage_root.into(),
            user_id,
            dream_id,
        }
    }

    /// Directory relative to the storage root, always `/`-separated.
    pub fn relative_dir(&self) -> String {
        format!("users/{}/dreams/{}", self.user_id, self.dream_id)
    }

    pub fn job_dir(&self) -> PathBuf {
        self.storage_root.join(self.relative_dir())
    }

    pub fn keyframes_dir(&self) -> PathBuf {
        self.job_dir().join(KEYFRAMES_DIR)
    }

    pub fn generation_config_path(&self) -> PathBuf {
        self.job_dir().join(GENERATION_CONFIG_FILE)
    }

    pub fn progress_path(&self) -> PathBuf {
        self.job_dir().join(PROGRESS_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.job_dir().join(MANIFEST_FILE)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.job_dir().join(KEYFRAMES_ARCHIVE_FILE)
    }

    /// Resolve a storage-relative path against the storage root.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.storage_root.join(relative)
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    fn relative(&self, file: &str) -> String {
        format!("{}/{file}", self.relative_dir())
    }

    /// Artifact paths for a successful job of the given shape.
    pub fn artifacts(&self, shape: OutputShape) -> ArtifactPaths {
        match shape {
            OutputShape::Video => ArtifactPaths {
                video_path: Some(self.relative(VIDEO_FILE)),
                preview_path: Some(self.relative(PREVIEW_FILE)),
                keyframes_zip_path: None,
            },
            OutputShape::ImageSet => ArtifactPaths {
                video_path: None,
                preview_path: None,
                keyframes_zip_path: Some(self.relative(KEYFRAMES_ARCHIVE_FILE)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_dir_is_keyed_by_user_and_dream() {
        let layout = JobLayout::new("/srv/storage", 7, 42);
        assert_eq!(layout.relative_dir(), "users/7/dreams/42");
        assert_eq!(
            layout.job_dir(),
            PathBuf::from("/srv/storage/users/7/dreams/42")
        );
        assert_eq!(
            layout.keyframes_dir(),
            PathBuf::from("/srv/storage/users/7/dreams/42/keyframes")
        );
    }

    #[test]
    fn video_shape_yields_video_and_preview() {
        let paths = JobLayout::new("/s", 1, 2).artifacts(OutputShape::Video);
        assert_eq!(paths.video_path.as_deref(), Some("users/1/dreams/2/final.mp4"));
        assert_eq!(paths.preview_path.as_deref(), Some("users/1/dreams/2/preview.jpg"));
        assert_eq!(paths.keyframes_zip_path, None);
    }

    #[test]
    fn image_set_shape_yields_archive_only() {
        let paths = JobLayout::new("/s", 1, 2).artifacts(OutputShape::ImageSet);
        assert_eq!(paths.video_path, None);
        assert_eq!(
            paths.keyframes_zip_path.as_deref(),
            Some("users/1/dreams/2/keyframes.zip")
        );
    }

    #[test]
    fn relative_paths_resolve_back_into_job_dir() {
        let layout = JobLayout::new("/s", 1, 2);
        let paths = layout.artifacts(OutputShape::ImageSet);
        assert_eq!(
            layout.resolve(paths.keyframes_zip_path.as_deref().unwrap()),
            layout.archive_path()
        );
    }

    #[test]
    fn shape_round_trips_through_flag() {
        assert!(OutputShape::from_photos_only(true).is_photos_only());
        assert_eq!(OutputShape::from_photos_only(false), OutputShape::Video);
    }
}
