//! Capture cycle state machine.
//!
//! ```text
//! IDLE ─▶ CAPTURING ─▶ UPLOADING ─▶ RECORDING ─▶ ACKNOWLEDGING ─▶ SUCCEEDED
//!             │            │            │              │
//!             └────────────┴────────────┴──────────────┴────────▶ FAILED
//! ```
//!
//! A cycle never retries a stage. The result record is always written before
//! the acknowledgment, so a crash in between leaves a duplicate record rather
//! than a lost one. The local artifact is released on every exit path.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use super::artifact::{artifact_name, LocalArtifact};
use crate::command_channel::channel::CommandChannel;
use crate::command_channel::types::{CommandUpdate, Snapshot};
use crate::configuration::types::{FailureAction, FailurePolicy, TimeoutConfig};
use crate::configuration::Config;
use crate::data_capture::CaptureProvider;
use crate::error_handling::types::{CycleError, DeviceError, PersistenceError, TransferError};
use crate::storage::storage_trait::{ArtifactStore, ResultLedger};
use crate::storage::types::NewResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Capturing,
    Uploading,
    Recording,
    Acknowledging,
    Succeeded,
    Failed,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Idle => "idle",
            CycleState::Capturing => "capturing",
            CycleState::Uploading => "uploading",
            CycleState::Recording => "recording",
            CycleState::Acknowledging => "acknowledging",
            CycleState::Succeeded => "succeeded",
            CycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One in-flight cycle. Never persisted.
#[derive(Debug, Clone)]
pub struct CaptureAttempt {
    /// Revision of the snapshot that triggered the cycle.
    pub trigger_time: DateTime<Utc>,
    /// 1-based attempt number for the triggering request.
    pub attempt: u32,
    pub artifact_name: String,
    pub local_artifact_path: Option<PathBuf>,
    pub remote_url: Option<String>,
    pub state: CycleState,
}

impl CaptureAttempt {
    fn new(trigger_time: DateTime<Utc>, attempt: u32, artifact_name: String) -> Self {
        Self {
            trigger_time,
            attempt,
            artifact_name,
            local_artifact_path: None,
            remote_url: None,
            state: CycleState::Idle,
        }
    }

    fn enter(&mut self, next: CycleState) {
        debug!("[{}] {} -> {}", self.artifact_name, self.state, next);
        self.state = next;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Succeeded {
        record_id: String,
        image_url: String,
    },
    Failed {
        /// State the cycle was in when it failed.
        stage: CycleState,
        error: String,
        action: FailureAction,
    },
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub attempt: CaptureAttempt,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Succeeded { .. })
    }
}

/// Upper bounds for each external call of a cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleTimeouts {
    pub capture: Duration,
    pub upload: Duration,
    pub write: Duration,
}

impl From<&TimeoutConfig> for CycleTimeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            capture: Duration::from_secs(config.capture_secs),
            upload: Duration::from_secs(config.upload_secs),
            write: Duration::from_secs(config.write_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub work_dir: PathBuf,
    pub prefix: String,
    pub extension: String,
    pub message: String,
    pub policy: FailurePolicy,
    pub timeouts: CycleTimeouts,
}

impl CycleSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            work_dir: config.cycle.work_dir.clone(),
            prefix: config.storage.prefix.trim_matches('/').to_string(),
            extension: config.camera.extension.clone(),
            message: config.cycle.message.clone(),
            policy: config.cycle.failure_policy,
            timeouts: CycleTimeouts::from(&config.timeouts),
        }
    }
}

/// Runs `fut`, turning an elapsed deadline into the caller's error.
async fn bounded<T, E, F>(limit: Duration, fut: F, on_timeout: fn(Duration) -> E) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(limit)),
    }
}

/// Executes capture cycles against the injected collaborators.
pub struct CaptureCycle {
    camera: Arc<dyn CaptureProvider>,
    store: Arc<dyn ArtifactStore>,
    ledger: Arc<dyn ResultLedger>,
    channel: Arc<dyn CommandChannel>,
    settings: CycleSettings,
}

impl CaptureCycle {
    pub fn new(
        camera: Arc<dyn CaptureProvider>,
        store: Arc<dyn ArtifactStore>,
        ledger: Arc<dyn ResultLedger>,
        channel: Arc<dyn CommandChannel>,
        settings: CycleSettings,
    ) -> Self {
        Self {
            camera,
            store,
            ledger,
            channel,
            settings,
        }
    }

    /// Runs one cycle for `trigger`. Never returns an error: failures are
    /// logged, handled per the failure policy and reported in the outcome.
    pub async fn run(&self, trigger: &Snapshot, attempt_no: u32) -> CycleReport {
        let name = artifact_name(Utc::now(), &self.settings.extension);
        let mut attempt = CaptureAttempt::new(trigger.update_time, attempt_no, name);
        info!(
            "[{}] capture requested (rev {}, attempt {})",
            attempt.artifact_name, attempt.trigger_time, attempt.attempt
        );

        let mut local: Option<LocalArtifact> = None;
        let result = self.execute(&mut attempt, &mut local).await;
        if let Some(artifact) = local.take() {
            artifact.release().await;
        }

        let outcome = match result {
            Ok((record_id, image_url)) => {
                attempt.enter(CycleState::Succeeded);
                info!(
                    "[{}] cycle succeeded: record {} -> {}",
                    attempt.artifact_name, record_id, image_url
                );
                CycleOutcome::Succeeded {
                    record_id,
                    image_url,
                }
            }
            Err(err) => {
                let stage = attempt.state;
                attempt.enter(CycleState::Failed);
                let action = self.settings.policy.on_failure(attempt_no);
                error!(
                    "[{}] cycle failed while {} (rev {}, attempt {}): {}",
                    attempt.artifact_name, stage, attempt.trigger_time, attempt_no, err
                );
                self.handle_failure(&attempt, action).await;
                CycleOutcome::Failed {
                    stage,
                    error: err.to_string(),
                    action,
                }
            }
        };

        CycleReport { attempt, outcome }
    }

    async fn execute(
        &self,
        attempt: &mut CaptureAttempt,
        local: &mut Option<LocalArtifact>,
    ) -> Result<(String, String), CycleError> {
        let timeouts = self.settings.timeouts;

        attempt.enter(CycleState::Capturing);
        let frame = bounded(timeouts.capture, self.camera.capture(), DeviceError::Timeout)
            .await
            .map_err(CycleError::Device)?;
        if frame.is_empty() {
            return Err(CycleError::Device(DeviceError::EmptyFrame));
        }
        let artifact =
            LocalArtifact::create(&self.settings.work_dir, &attempt.artifact_name, &frame)
                .await
                .map_err(CycleError::Artifact)?;
        attempt.local_artifact_path = Some(artifact.path().to_path_buf());
        let artifact = local.insert(artifact);

        attempt.enter(CycleState::Uploading);
        let bytes = artifact.read().await.map_err(CycleError::Artifact)?;
        let remote_path = format!("{}/{}", self.settings.prefix, artifact.name());
        let image_url = bounded(
            timeouts.upload,
            self.store.upload(bytes, &remote_path),
            TransferError::Timeout,
        )
        .await
        .map_err(CycleError::Transfer)?;
        if image_url.trim().is_empty() {
            return Err(CycleError::Transfer(TransferError::UrlUnresolvable(
                remote_path,
            )));
        }
        attempt.remote_url = Some(image_url.clone());
        info!("[{}] uploaded to {}", attempt.artifact_name, image_url);

        attempt.enter(CycleState::Recording);
        let result = NewResult::captured(image_url.clone(), self.settings.message.clone());
        let record_id = bounded(
            timeouts.write,
            self.ledger.add(&result),
            PersistenceError::Timeout,
        )
        .await
        .map_err(CycleError::Record)?;

        attempt.enter(CycleState::Acknowledging);
        bounded(
            timeouts.write,
            self.channel.update(&CommandUpdate::acknowledge()),
            PersistenceError::Timeout,
        )
        .await
        .map_err(CycleError::Acknowledge)?;

        Ok((record_id, image_url))
    }

    async fn handle_failure(&self, attempt: &CaptureAttempt, action: FailureAction) {
        match action {
            FailureAction::Clear => {
                let cleared = bounded(
                    self.settings.timeouts.write,
                    self.channel.update(&CommandUpdate::clear_request()),
                    PersistenceError::Timeout,
                )
                .await;
                match cleared {
                    Ok(()) => warn!(
                        "[{}] request cleared after failure; operator must re-request",
                        attempt.artifact_name
                    ),
                    Err(e) => error!(
                        "[{}] failed to clear request after failure: {}",
                        attempt.artifact_name, e
                    ),
                }
            }
            FailureAction::Leave => warn!(
                "[{}] request left pending after failure",
                attempt.artifact_name
            ),
            FailureAction::Retry(backoff) => warn!(
                "[{}] request left pending, retrying in {:?}",
                attempt.artifact_name, backoff
            ),
        }
    }
}
