//! Camera driven through an external still-capture program.
//!
//! Most edge devices already ship a reliable CLI for grabbing a frame
//! (`fswebcam`, `libcamera-still`, `ffmpeg -f v4l2 ...`). `CommandCamera`
//! runs it once per capture with an `{output}` placeholder pointing at a
//! scratch file, then reads the frame back.
//!
//! Minimal configuration
//! ```toml
//! [camera]
//! program = "fswebcam"
//! args = ["-r", "1280x720", "--no-banner", "{output}"]
//! warmup_ms = 2000
//! ```

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, trace};
use tokio::process::Command;

use super::provider::CaptureProvider;
use crate::configuration::types::CameraConfig;
use crate::error_handling::types::DeviceError;

const OUTPUT_PLACEHOLDER: &str = "{output}";

pub struct CommandCamera {
    program: String,
    args: Vec<String>,
    warmup: Duration,
    extension: String,
    scratch_dir: PathBuf,
}

impl CommandCamera {
    pub fn new<P: AsRef<Path>>(config: &CameraConfig, scratch_dir: P) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            warmup: Duration::from_millis(config.warmup_ms),
            extension: config.extension.clone(),
            scratch_dir: scratch_dir.as_ref().to_path_buf(),
        }
    }

    fn render_args(&self, output: &Path) -> Vec<String> {
        let output = output.display().to_string();
        self.args
            .iter()
            .map(|a| a.replace(OUTPUT_PLACEHOLDER, &output))
            .collect()
    }
}

/// Maps driver diagnostics onto the device error taxonomy.
fn classify_failure(stderr: &str) -> DeviceError {
    let lowered = stderr.to_lowercase();
    let detail = stderr.trim().to_string();
    if lowered.contains("busy") {
        DeviceError::Busy(detail)
    } else if lowered.contains("no such file")
        || lowered.contains("cannot open")
        || lowered.contains("no cameras available")
        || lowered.contains("not found")
    {
        DeviceError::NotConnected(detail)
    } else {
        DeviceError::CaptureFailed(detail)
    }
}

#[async_trait]
impl CaptureProvider for CommandCamera {
    async fn capture(&self) -> Result<Vec<u8>, DeviceError> {
        // The driver opens the device on every run; give the sensor time to
        // settle exposure before the frame is taken.
        if !self.warmup.is_zero() {
            trace!("Warming up camera for {:?}", self.warmup);
            tokio::time::sleep(self.warmup).await;
        }

        let scratch = tempfile::Builder::new()
            .prefix("frame-")
            .suffix(&format!(".{}", self.extension))
            .tempfile_in(&self.scratch_dir)?;
        let args = self.render_args(scratch.path());

        debug!("Running camera driver: {} {:?}", self.program, args);
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    DeviceError::NotConnected(format!("driver `{}` not found", self.program))
                }
                _ => DeviceError::IoError(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr));
        }

        let frame = tokio::fs::read(scratch.path()).await?;
        if frame.is_empty() {
            return Err(DeviceError::EmptyFrame);
        }
        info!("Captured frame of {} bytes", frame.len());
        Ok(frame)
    }
}
