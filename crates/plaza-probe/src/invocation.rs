//! Run kinds and the immutable description of one probe run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::ProbeConfig;

/// Fixed launch flags for a headless, deterministic startup.
pub const LAUNCH_FLAGS: &[&str] = &[
    "-log",
    "-stdout",
    "-FullStdOutLogOutput",
    "-nosplash",
    "-NullRHI",
    "-NoSound",
    "-unattended",
    "-nopause",
    "-ResX=800",
    "-ResY=600",
];

/// The two probe variants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    /// Short startup check.
    Smoke,

    /// Sustained run with repetition analysis.
    LongRun,
}

impl RunKind {
    /// Get the run kind name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            RunKind::Smoke => "smoke",
            RunKind::LongRun => "longrun",
        }
    }

    /// Title used in the first line of the summary.
    pub fn title(&self) -> &'static str {
        match self {
            RunKind::Smoke => "SMOKE TEST",
            RunKind::LongRun => "LONG RUN TEST",
        }
    }

    /// Prefix of the saved log file name.
    pub fn log_prefix(&self) -> &'static str {
        match self {
            RunKind::Smoke => "plaza_smoke",
            RunKind::LongRun => "plaza_longrun",
        }
    }

    /// Default run length in seconds.
    pub fn default_duration_secs(&self) -> u64 {
        match self {
            RunKind::Smoke => 10,
            RunKind::LongRun => 30,
        }
    }

    /// Whether normalized-line repetition is tracked.
    pub fn tracks_repetition(&self) -> bool {
        matches!(self, RunKind::LongRun)
    }

    /// Whether the silence watchdog is armed.
    pub fn watches_idle(&self) -> bool {
        matches!(self, RunKind::LongRun)
    }
}

/// Everything needed to launch and bound one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invocation {
    pub kind: RunKind,

    /// Path to the game binary.
    pub executable: PathBuf,

    /// Wall-clock bound for the run.
    pub duration: Duration,

    /// Optional map or scenario, passed as a bare trailing argument.
    pub map: Option<String>,

    /// Time allowed for a voluntary exit after the stop request.
    pub grace: Duration,

    /// Silence window for the hang watchdog, when armed.
    pub idle_warning: Option<Duration>,
}

impl Invocation {
    /// Create an invocation with the run kind's default duration and the
    /// default grace window.
    pub fn new(kind: RunKind, executable: impl Into<PathBuf>) -> Self {
        let config = ProbeConfig::default();
        Self {
            kind,
            executable: executable.into(),
            duration: Duration::from_secs(kind.default_duration_secs()),
            map: None,
            grace: config.grace,
            idle_warning: kind.watches_idle().then_some(config.idle_warning),
        }
    }

    /// Create an invocation whose grace and watchdog come from `config`.
    pub fn from_config(
        kind: RunKind,
        executable: impl Into<PathBuf>,
        config: &ProbeConfig,
    ) -> Self {
        Self {
            grace: config.grace,
            idle_warning: kind.watches_idle().then_some(config.idle_warning),
            ..Self::new(kind, executable)
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_map(mut self, map: Option<String>) -> Self {
        self.map = map.filter(|m| !m.is_empty());
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_idle_warning(mut self, idle: Option<Duration>) -> Self {
        self.idle_warning = idle;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Arguments passed to the executable: the fixed flags, then the map.
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = LAUNCH_FLAGS.iter().map(|f| f.to_string()).collect();
        if let Some(map) = &self.map {
            args.push(map.clone());
        }
        args
    }

    /// Full command line, for display.
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.executable.display().to_string()];
        parts.extend(self.args());
        parts.join(" ")
    }
}
