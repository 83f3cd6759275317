use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Camera driver invocation.
///
/// The program is started once per capture; every `{output}` token inside
/// `args` is replaced with the scratch file the driver must write the frame to.
#[derive(Debug, PartialEq, Clone, Deserialize)]
pub struct CameraConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_warmup_ms")]
    pub warmup_ms: u64,
    #[serde(default = "default_extension")]
    pub extension: String,
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
pub struct CommandConfig {
    /// Location of the well-known command record.
    pub document: PathBuf,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Capacity of the snapshot queue between the watcher and the loop.
    #[serde(default = "default_buffer")]
    pub buffer: usize,
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
pub struct LedgerConfig {
    pub directory: PathBuf,
}

/// Who can read uploaded artifacts. There is no default: deployments must
/// choose.
#[derive(Debug, PartialEq, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
pub struct StorageConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub bucket: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    pub visibility: Visibility,
    #[serde(default)]
    pub public_base_url: Option<String>,
}

/// What to do with the request flag when a cycle fails.
#[derive(Debug, PartialEq, Clone, Copy, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Clear `is_requested` and report through the logs.
    #[default]
    ClearAndReport,
    /// Leave the flag untouched; the operator re-arms it.
    LeaveRequested,
    /// Leave the flag set and run up to `max_attempts` cycles for the same
    /// request, `backoff_secs` apart, then clear.
    Retry { max_attempts: u32, backoff_secs: u64 },
}

/// Flag handling decided by [`FailurePolicy::on_failure`].
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum FailureAction {
    Clear,
    Leave,
    Retry(Duration),
}

impl FailurePolicy {
    /// `attempt` is 1-based: the first cycle for a request is attempt 1.
    pub fn on_failure(&self, attempt: u32) -> FailureAction {
        match *self {
            FailurePolicy::ClearAndReport => FailureAction::Clear,
            FailurePolicy::LeaveRequested => FailureAction::Leave,
            FailurePolicy::Retry {
                max_attempts,
                backoff_secs,
            } => {
                if attempt < max_attempts {
                    FailureAction::Retry(Duration::from_secs(backoff_secs))
                } else {
                    FailureAction::Clear
                }
            }
        }
    }
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
pub struct CycleConfig {
    /// Directory holding local artifacts while a cycle is in flight.
    pub work_dir: PathBuf,
    #[serde(default = "default_message")]
    pub message: String,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_capture_secs")]
    pub capture_secs: u64,
    #[serde(default = "default_upload_secs")]
    pub upload_secs: u64,
    #[serde(default = "default_write_secs")]
    pub write_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            capture_secs: default_capture_secs(),
            upload_secs: default_upload_secs(),
            write_secs: default_write_secs(),
        }
    }
}

fn default_warmup_ms() -> u64 {
    2000
}

fn default_extension() -> String {
    String::from("jpg")
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_buffer() -> usize {
    16
}

fn default_prefix() -> String {
    String::from("camera_uploads")
}

fn default_message() -> String {
    String::from("Photo captured")
}

fn default_capture_secs() -> u64 {
    30
}

fn default_upload_secs() -> u64 {
    60
}

fn default_write_secs() -> u64 {
    15
}
