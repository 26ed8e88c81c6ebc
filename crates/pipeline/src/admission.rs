//! Admission: the synchronous half of starting a generation.
//!
//! Everything that must hold together commits in one transaction: the user
//! row is locked, the quota ledger decides, the run is inserted as
//! `pending`, the dream flips to `processing` and the consumption is
//! written back. Only after commit is the run handed to the supervisor, so
//! a crash can never leave consumption without a run or the reverse.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sublym_core::artifacts::JobLayout;
use sublym_core::error::CoreError;
use sublym_core::quota::{can_admit, check_subliminal, output_shape, record_consumption};
use sublym_core::types::DbId;
use sublym_db::models::photo::Photo;
use sublym_db::models::run::NewRun;
use sublym_db::models::status::RunStatus;
use sublym_db::repositories::{DreamRepo, PhotoRepo, RunRepo, SubscriptionTierRepo, UserRepo};

use crate::config::GenerationSettings;
use crate::error::PipelineError;
use crate::supervisor::{SupervisedJob, Supervisor};
use crate::worker::{GenerationConfigDocument, GenerationMode, WorkerInput};

/// Rough wall-clock estimate returned to the caller at admission.
pub const ESTIMATED_DURATION_SECS: i64 = 180;

/// Prefix of every trace id.
pub const TRACE_ID_PREFIX: &str = "trc_";

/// Optional parameters of a generation request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartJob {
    /// `scenario` (default), `free_scenes` or `scenario_pub`.
    pub mode: Option<String>,
    /// Requires a tier that allows subliminal text.
    pub subliminal: Option<String>,
    pub daily_context: Option<String>,
    /// Scene-type code per scene, forwarded to the worker.
    pub scene_composition: Option<Vec<String>>,
}

/// Returned to the caller once the run exists.
#[derive(Debug, Clone, Serialize)]
pub struct AdmittedJob {
    pub run_id: DbId,
    pub trace_id: String,
    pub status: RunStatus,
    pub estimated_duration_secs: i64,
}

pub fn new_trace_id() -> String {
    format!("{TRACE_ID_PREFIX}{}", uuid::Uuid::new_v4().simple())
}

/// Every selected photo must exist, belong to the user and be verified.
/// `found` is what the store returned for the user; ids absent from it
/// belong to nobody or to someone else.
pub fn check_photos(selected: &[DbId], found: &[Photo]) -> Result<(), CoreError> {
    let wanted: BTreeSet<DbId> = selected.iter().copied().collect();
    if wanted.is_empty() {
        return Err(CoreError::Validation(
            "Select at least one verified photo before generating".to_string(),
        ));
    }
    let present: BTreeSet<DbId> = found.iter().map(|p| p.id).collect();
    if let Some(missing) = wanted.difference(&present).next() {
        return Err(CoreError::Validation(format!("Photo {missing} not found")));
    }
    if let Some(unverified) = found.iter().find(|p| !p.verified) {
        return Err(CoreError::Validation(format!(
            "Photo {} has not been verified yet",
            unverified.id
        )));
    }
    Ok(())
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Admit a generation for `dream_id` and hand it to the supervisor.
pub async fn start_job(
    pool: &PgPool,
    supervisor: &Supervisor,
    user_id: DbId,
    dream_id: DbId,
    request: &StartJob,
) -> Result<AdmittedJob, PipelineError> {
    let dream = DreamRepo::find_for_user(pool, dream_id, user_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "Dream",
            id: dream_id,
        })?;

    if !dream.status().is_some_and(|s| s.accepts_new_run()) {
        return Err(CoreError::Conflict(
            "A generation is already in progress for this dream".to_string(),
        )
        .into());
    }

    let photos = PhotoRepo::find_for_user(pool, user_id, &dream.photo_ids).await?;
    check_photos(&dream.photo_ids, &photos)?;

    let mode = request
        .mode
        .as_deref()
        .map(str::parse::<GenerationMode>)
        .transpose()?;
    let subliminal = non_blank(&request.subliminal);
    let daily_context = non_blank(&request.daily_context);

    let config = supervisor.config();
    let settings = GenerationSettings::load(pool, config).await?;
    let now = Utc::now();
    let trace_id = new_trace_id();

    let mut tx = pool.begin().await?;

    let user = UserRepo::lock_for_update(&mut tx, user_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "User",
            id: user_id,
        })?;
    let tier = SubscriptionTierRepo::find_by_level(&mut tx, user.subscription_level)
        .await?
        .map(|t| t.limits());

    let mut quota = user.quota();
    let used_free_credit = can_admit(&quota, tier.as_ref(), now).into_result()?;
    check_subliminal(tier.as_ref(), subliminal.is_some())?;
    let shape = output_shape(tier.as_ref());

    if !DreamRepo::mark_processing(&mut tx, dream.id).await? {
        return Err(CoreError::Conflict(
            "A generation is already in progress for this dream".to_string(),
        )
        .into());
    }

    let run = RunRepo::create(
        &mut tx,
        &NewRun {
            trace_id: trace_id.clone(),
            dream_id: dream.id,
            user_id,
            photos_only: shape.is_photos_only(),
            used_free_credit,
            scenes_count: settings.scenes_count,
        },
    )
    .await?;

    record_consumption(&mut quota, used_free_credit, now);
    UserRepo::save_quota(&mut tx, user_id, &quota).await?;
    DreamRepo::set_last_run(&mut tx, dream.id, run.id).await?;

    tx.commit().await?;

    tracing::info!(
        trace_id = %trace_id,
        run_id = run.id,
        dream_id = dream.id,
        user_id,
        used_free_credit,
        photos_only = shape.is_photos_only(),
        "Generation admitted",
    );

    let layout = JobLayout::new(&config.storage_root, user_id, dream.id);
    let job = SupervisedJob {
        run_id: run.id,
        trace_id: trace_id.clone(),
        user_id,
        dream_id: dream.id,
        shape,
        input: WorkerInput {
            dream: dream.description.clone(),
            photos: photos
                .iter()
                .map(|p| config.storage_root.join(&p.file_path))
                .collect::<Vec<PathBuf>>(),
            trace_id: trace_id.clone(),
            output_dir: layout.job_dir(),
            scenes_count: settings.scenes_count,
            keyframes_count: settings.keyframes_count,
            character_name: user.first_name.clone(),
            character_gender: user.gender.clone(),
            reject: dream.reject.clone(),
            subliminal,
            photos_only: shape.is_photos_only(),
            mode,
            daily_context: daily_context.clone(),
        },
        generation_config: GenerationConfigDocument::new(
            &settings,
            request.scene_composition.clone(),
            daily_context,
        ),
        timeout: settings.worker_timeout(),
    };
    supervisor.spawn(job);

    Ok(AdmittedJob {
        run_id: run.id,
        trace_id,
        status: RunStatus::Pending,
        estimated_duration_secs: ESTIMATED_DURATION_SECS,
    })
}
