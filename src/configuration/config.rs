use super::types::*;
use crate::error_handling::types::ConfigError;
use clap::Parser;
use log::{debug, info};
use serde::Deserialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Command-line surface of the agent.
///
/// Only the configuration file location is accepted; everything else lives in
/// the TOML file so a device can be reprovisioned by replacing one file.
///
/// # Command Line
/// `shutterbug <CONFIG_FILE>` or `SHUTTERBUG_CONFIG=<CONFIG_FILE> shutterbug`
#[derive(Parser, Debug, Clone)]
#[command(name = "shutterbug")]
#[command(version)]
#[command(about = "Remote capture agent: photographs on request and publishes the result")]
pub struct Args {
    /// Path to the TOML configuration file
    #[arg(env = "SHUTTERBUG_CONFIG")]
    pub config_file: PathBuf,
}

/// Application configuration structure that defines all runtime parameters.
///
/// # Fields Overview
///
/// - `camera`: driver program used by the capture provider
/// - `command`: location and polling of the command record
/// - `ledger`: where result records are appended
/// - `storage`: artifact store root, bucket, path prefix and visibility
/// - `cycle`: local work directory, result message and failure policy
/// - `timeouts`: upper bound for every external call made by a cycle
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use shutterbug::configuration::config::Config;
///
/// let config = Config::from_file(Path::new("/etc/shutterbug.toml")).unwrap();
/// println!("watching {}", config.command.document.display());
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    pub camera: CameraConfig,
    pub command: CommandConfig,
    pub ledger: LedgerConfig,
    pub storage: StorageConfig,
    pub cycle: CycleConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Config {
    /// Reads, parses and validates the configuration file at `path`.
    ///
    /// Any error returned here is fatal: the agent must not start listening.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading configuration from {}", path.display());
        let raw = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&raw)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(raw).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.program.trim().is_empty() {
            return Err(ConfigError::EmptyCommand(String::from(
                "`camera.program` must not be empty",
            )));
        }
        if !self.camera.args.iter().any(|a| a.contains("{output}")) {
            return Err(ConfigError::EmptyCommand(String::from(
                "`camera.args` must contain an `{output}` placeholder",
            )));
        }

        if self.storage.bucket.trim().is_empty() {
            return Err(ConfigError::MissingBucket);
        }
        if self.storage.prefix.trim_matches('/').is_empty() {
            return Err(ConfigError::NotInRange(String::from(
                "`storage.prefix` must not be empty",
            )));
        }
        let prefix = Path::new(self.storage.prefix.trim_matches('/'));
        if !prefix.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(ConfigError::NotInRange(format!(
                "`storage.prefix` must be a plain relative path, got `{}`",
                self.storage.prefix
            )));
        }
        if self.storage.visibility == Visibility::Public
            && self
                .storage
                .public_base_url
                .as_deref()
                .map_or(true, |u| u.trim().is_empty())
        {
            return Err(ConfigError::MissingPublicUrl);
        }

        if self.command.poll_interval_ms == 0 {
            return Err(ConfigError::NotInRange(String::from(
                "`command.poll_interval_ms` must be greater than 0",
            )));
        }
        if self.command.buffer == 0 {
            return Err(ConfigError::NotInRange(String::from(
                "`command.buffer` must be greater than 0",
            )));
        }
        match self.command.document.parent() {
            Some(dir) if !dir.as_os_str().is_empty() && !dir.is_dir() => {
                return Err(ConfigError::DirectoryDoesNotExist(format!(
                    "command document directory {} does not exist",
                    dir.display()
                )));
            }
            _ => {}
        }

        for (name, value) in [
            ("timeouts.capture_secs", self.timeouts.capture_secs),
            ("timeouts.upload_secs", self.timeouts.upload_secs),
            ("timeouts.write_secs", self.timeouts.write_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::NotInRange(format!(
                    "`{}` must be greater than 0",
                    name
                )));
            }
        }

        if let FailurePolicy::Retry { max_attempts, .. } = self.cycle.failure_policy {
            if max_attempts == 0 {
                return Err(ConfigError::NotInRange(String::from(
                    "`cycle.failure_policy.max_attempts` must be at least 1",
                )));
            }
        }

        Ok(())
    }
}
