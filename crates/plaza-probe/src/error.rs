//! Error types for the probe library.

use std::path::PathBuf;

/// Errors that abort a probe run before a verdict can be produced.
///
/// Classification-level problems (critical log lines, repetition storms,
/// unexpected exit codes) are never errors: they are findings on the
/// [`Verdict`](crate::verdict::Verdict).
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The executable could not be spawned because it does not exist.
    #[error("executable not found: {}", path.display())]
    ExecutableNotFound { path: PathBuf },

    /// No executable was given and none was found in the search locations.
    #[error("could not locate the game executable ({} location(s) searched)", searched.len())]
    ExecutableNotResolved { searched: Vec<PathBuf> },

    /// Spawning failed for a reason other than a missing file.
    #[error("failed to launch {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid probe configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProbeError {
    /// Whether this error means the target binary is missing, as opposed to a
    /// run that launched and then failed.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ProbeError::ExecutableNotFound { .. } | ProbeError::ExecutableNotResolved { .. }
        )
    }
}

/// Result type for probe operations.
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;
