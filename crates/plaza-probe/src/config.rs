//! Probe configuration sourced from the environment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ProbeError, ProbeResult};

/// Environment variable naming the game executable.
pub const ENV_EXECUTABLE: &str = "PLAZA_EXECUTABLE";
/// Environment variable naming the directory for saved run logs.
pub const ENV_LOG_DIR: &str = "PLAZA_LOG_DIR";
/// Environment variable overriding the terminate grace window (seconds).
pub const ENV_GRACE_SECS: &str = "PLAZA_GRACE_SECS";
/// Environment variable overriding the long-run repetition threshold.
pub const ENV_REPEAT_THRESHOLD: &str = "PLAZA_REPEAT_THRESHOLD";

pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_GRACE_SECS: u64 = 5;
pub const DEFAULT_REPEAT_THRESHOLD: usize = 10;
pub const DEFAULT_IDLE_WARNING_SECS: u64 = 10;

/// Settings shared by every probe run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeConfig {
    /// Executable override from the environment (not validated here).
    pub executable: Option<PathBuf>,

    /// Directory that receives saved run logs.
    pub log_dir: PathBuf,

    /// How long to wait for a voluntary exit after the stop request.
    pub grace: Duration,

    /// Occurrences of one normalized line that count as a repetition storm.
    pub repeat_threshold: usize,

    /// Silence after which the long-run watchdog emits a warning.
    pub idle_warning: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            executable: None,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            grace: Duration::from_secs(DEFAULT_GRACE_SECS),
            repeat_threshold: DEFAULT_REPEAT_THRESHOLD,
            idle_warning: Duration::from_secs(DEFAULT_IDLE_WARNING_SECS),
        }
    }
}

impl ProbeConfig {
    /// Build a config from the process environment.
    pub fn from_env() -> ProbeResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> ProbeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_EXECUTABLE).filter(|v| !v.trim().is_empty()) {
            config.executable = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup(ENV_LOG_DIR).filter(|v| !v.trim().is_empty()) {
            config.log_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(ENV_GRACE_SECS) {
            let secs = raw.trim().parse::<u64>().map_err(|_| {
                ProbeError::InvalidConfig(format!("{ENV_GRACE_SECS} must be whole seconds, got {raw:?}"))
            })?;
            config.grace = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup(ENV_REPEAT_THRESHOLD) {
            let threshold = raw.trim().parse::<usize>().map_err(|_| {
                ProbeError::InvalidConfig(format!(
                    "{ENV_REPEAT_THRESHOLD} must be a positive integer, got {raw:?}"
                ))
            })?;
            config = config.with_repeat_threshold(threshold)?;
        }

        Ok(config)
    }

    pub fn with_executable(mut self, path: PathBuf) -> Self {
        self.executable = Some(path);
        self
    }

    pub fn with_log_dir(mut self, dir: PathBuf) -> Self {
        self.log_dir = dir;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Set the repetition threshold. Zero would flag every line and is rejected.
    pub fn with_repeat_threshold(mut self, threshold: usize) -> ProbeResult<Self> {
        if threshold == 0 {
            return Err(ProbeError::InvalidConfig(
                "repetition threshold must be at least 1".to_string(),
            ));
        }
        self.repeat_threshold = threshold;
        Ok(self)
    }
}
