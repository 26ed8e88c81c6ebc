//! The worker's input contract: command-line arguments and the generation
//! configuration document written next to them.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;

use serde::Serialize;
use sublym_core::error::CoreError;
use sublym_db::models::generation_setting::SceneType;
use tokio::process::Command;

use crate::config::{GenerationSettings, PipelineConfig};

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Generation mode selector passed through to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    Scenario,
    FreeScenes,
    ScenarioPub,
}

impl GenerationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scenario => "scenario",
            Self::FreeScenes => "free_scenes",
            Self::ScenarioPub => "scenario_pub",
        }
    }
}

impl FromStr for GenerationMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scenario" => Ok(Self::Scenario),
            "free_scenes" => Ok(Self::FreeScenes),
            "scenario_pub" => Ok(Self::ScenarioPub),
            other => Err(CoreError::Validation(format!(
                "Unknown generation mode '{other}' (expected scenario, free_scenes or scenario_pub)"
            ))),
        }
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Everything the worker receives on its command line.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerInput {
    pub dream: String,
    /// Absolute paths of the verified photos.
    pub photos: Vec<PathBuf>,
    pub trace_id: String,
    pub output_dir: PathBuf,
    pub scenes_count: i32,
    pub keyframes_count: i32,
    pub character_name: Option<String>,
    pub character_gender: Option<String>,
    pub reject: Vec<String>,
    pub subliminal: Option<String>,
    pub photos_only: bool,
    pub mode: Option<GenerationMode>,
    pub daily_context: Option<String>,
}

impl WorkerInput {
    /// Render the argument list. Optional values are omitted when absent or
    /// blank.
    pub fn args(&self) -> Vec<String> {
        let photos = self
            .photos
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(",");

        let mut args = vec![
            "--dream".to_string(),
            self.dream.clone(),
            "--photos".to_string(),
            photos,
            "--trace-id".to_string(),
            self.trace_id.clone(),
            "--output-dir".to_string(),
            self.output_dir.to_string_lossy().into_owned(),
            "--scenes-count".to_string(),
            self.scenes_count.to_string(),
            "--keyframes-count".to_string(),
            self.keyframes_count.to_string(),
        ];

        push_opt(&mut args, "--character-name", self.character_name.as_deref());
        push_opt(&mut args, "--character-gender", self.character_gender.as_deref());

        let reject = self
            .reject
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .collect::<Vec<_>>()
            .join(",");
        push_opt(&mut args, "--reject", Some(&reject));

        push_opt(&mut args, "--subliminal", self.subliminal.as_deref());
        if self.photos_only {
            args.push("--photos-only".to_string());
        }
        push_opt(&mut args, "--mode", self.mode.map(GenerationMode::as_str));
        push_opt(&mut args, "--daily-context", self.daily_context.as_deref());
        args
    }
}

fn push_opt(args: &mut Vec<String>, flag: &str, value: Option<&str>) {
    if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
        args.push(flag.to_string());
        args.push(value.to_string());
    }
}

/// Build the worker command with piped stdio. The child is killed if its
/// handle is dropped.
pub fn build_command(config: &PipelineConfig, input: &WorkerInput) -> Command {
    let mut cmd = Command::new(&config.worker_program);
    if let Some(script) = &config.worker_script {
        cmd.arg(script);
    }
    cmd.args(input.args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

// ---------------------------------------------------------------------------
// Configuration document
// ---------------------------------------------------------------------------

/// Scene type as the worker expects it, keyed by code in the document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneTypeSpec {
    pub description: String,
    pub min_ratio: f64,
    pub max_ratio: f64,
    pub examples: serde_json::Value,
}

impl From<&SceneType> for SceneTypeSpec {
    fn from(st: &SceneType) -> Self {
        Self {
            description: st.description.clone(),
            min_ratio: st.min_ratio,
            max_ratio: st.max_ratio,
            examples: st.examples.clone(),
        }
    }
}

/// Contents of `generation_config.json`, read by the worker at startup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationConfigDocument {
    pub max_attempts: u32,
    pub max_video_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_video: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub scene_types: BTreeMap<String, SceneTypeSpec>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub prompts: BTreeMap<String, String>,
    /// Optional scene-type code per scene, in order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_composition: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_context: Option<String>,
}

impl GenerationConfigDocument {
    pub fn new(
        settings: &GenerationSettings,
        scene_composition: Option<Vec<String>>,
        daily_context: Option<String>,
    ) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            max_video_attempts: settings.max_video_attempts,
            model_scenario: settings.model_scenario.clone(),
            model_image: settings.model_image.clone(),
            model_video: settings.model_video.clone(),
            scene_types: settings
                .scene_types
                .iter()
                .map(|(code, st)| (code.clone(), SceneTypeSpec::from(st)))
                .collect(),
            prompts: settings.prompts.clone(),
            scene_composition: scene_composition.filter(|c| !c.is_empty()),
            daily_context: daily_context.filter(|c| !c.trim().is_empty()),
        }
    }
}
