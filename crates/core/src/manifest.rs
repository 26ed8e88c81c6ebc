//! Result manifest written by the worker before a successful exit.
//!
//! A missing manifest is tolerated and treated as an empty object; every
//! field then falls back to a hard-coded default. A manifest that exists but
//! cannot be read or parsed is an error, since the worker claimed success and
//! produced garbage.

use std::io;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

/// Scene duration assumed when the manifest does not report one.
pub const DEFAULT_SCENE_DURATION_SECS: f64 = 6.0;

/// Manifest as written by the worker (camelCase keys, every field optional).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunManifest {
    pub success: Option<bool>,
    pub scenario_name: Option<String>,
    pub scenes_count: Option<i32>,
    /// Total duration in seconds.
    pub duration: Option<f64>,
    pub cost_eur: Option<f64>,
    pub cost_details: Option<Value>,
    pub errors: Vec<String>,
}

/// Manifest values after fallbacks have been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedManifest {
    pub scenario_name: Option<String>,
    pub scenes_count: i32,
    pub duration_secs: f64,
    pub cost_eur: f64,
    pub cost_details: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read result manifest: {0}")]
    Io(#[from] io::Error),

    #[error("Result manifest is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

impl RunManifest {
    /// Load the manifest at `path`. A missing file yields the empty manifest.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        match std::fs::read(path) {
            Ok(bytes) => Self::parse(&bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ManifestError::Io(e)),
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ManifestError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Apply fallbacks. `requested_scenes` is the scene count the worker was
    /// asked for.
    pub fn resolve(self, requested_scenes: i32) -> ResolvedManifest {
        let scenes_count = self.scenes_count.unwrap_or(requested_scenes);
        ResolvedManifest {
            scenario_name: self.scenario_name,
            scenes_count,
            duration_secs: self
                .duration
                .unwrap_or(f64::from(scenes_count) * DEFAULT_SCENE_DURATION_SECS),
            cost_eur: self.cost_eur.unwrap_or(0.0),
            cost_details: self
                .cost_details
                .unwrap_or_else(|| Value::Object(Default::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_manifest_is_parsed() {
        let json = br#"{
            "success": true,
            "scenarioName": "Flying over Lisbon",
            "scenesCount": 5,
            "duration": 31.5,
            "costEur": 1.42,
            "costDetails": {"video": 1.2, "image": 0.22},
            "errors": []
        }"#;
        let resolved = RunManifest::parse(json).unwrap().resolve(4);
        assert_eq!(resolved.scenario_name.as_deref(), Some("Flying over Lisbon"));
        assert_eq!(resolved.scenes_count, 5);
        assert_eq!(resolved.duration_secs, 31.5);
        assert_eq!(resolved.cost_eur, 1.42);
        assert_eq!(resolved.cost_details["video"], 1.2);
    }

    #[test]
    fn empty_object_uses_fallbacks() {
        let resolved = RunManifest::parse(b"{}").unwrap().resolve(4);
        assert_eq!(resolved.scenes_count, 4);
        assert_eq!(resolved.duration_secs, 24.0);
        assert_eq!(resolved.cost_eur, 0.0);
        assert_eq!(resolved.cost_details, serde_json::json!({}));
    }

    #[test]
    fn missing_file_is_empty_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = RunManifest::load(&dir.path().join("result.json")).unwrap();
        assert_eq!(manifest, RunManifest::default());
    }

    #[test]
    fn unparseable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        std::fs::write(&path, "{ truncated").unwrap();
        assert!(matches!(
            RunManifest::load(&path),
            Err(ManifestError::Parse(_))
        ));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let manifest = RunManifest::parse(br#"{"scenesCount": 3, "extra": 1}"#).unwrap();
        assert_eq!(manifest.scenes_count, Some(3));
    }
}
