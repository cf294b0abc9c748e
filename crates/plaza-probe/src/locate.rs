//! Game executable discovery.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ProbeError, ProbeResult};

/// Build output locations probed relative to the project root.
pub const DEFAULT_BINARY_PATHS: &[&str] = &[
    "Binaries/Linux/ActionRoguelike",
    "../Binaries/Linux/ActionRoguelike",
    "../../Binaries/Linux/ActionRoguelike",
    "Binaries/Win64/ActionRoguelike.exe",
    "../Binaries/Win64/ActionRoguelike.exe",
];

/// How many parent directories are searched for a `.uproject` file.
const PROJECT_ROOT_DEPTH: usize = 5;

/// Resolve the executable to launch.
///
/// Priority:
/// 1. `explicit` - used as-is; a missing file surfaces later as
///    [`ProbeError::ExecutableNotFound`] when spawning.
/// 2. `env_override` - used only if it names an existing file.
/// 3. [`DEFAULT_BINARY_PATHS`] under the project root found from `start_dir`.
pub fn resolve_executable(
    explicit: Option<&Path>,
    env_override: Option<&Path>,
    start_dir: &Path,
) -> ProbeResult<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    if let Some(path) = env_override {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        warn!(path = %path.display(), "executable override does not exist");
    }

    let root = find_project_root(start_dir).unwrap_or_else(|| start_dir.to_path_buf());
    debug!(root = %root.display(), "searching default build locations");

    let candidates: Vec<PathBuf> = DEFAULT_BINARY_PATHS
        .iter()
        .map(|rel| root.join(rel))
        .collect();

    for candidate in &candidates {
        if candidate.is_file() {
            return Ok(candidate.canonicalize().unwrap_or_else(|_| candidate.clone()));
        }
    }

    Err(ProbeError::ExecutableNotResolved {
        searched: candidates,
    })
}

/// Walk up from `start` looking for a directory holding a `*.uproject` file.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    for _ in 0..PROJECT_ROOT_DEPTH {
        let dir = current?;
        if contains_uproject(dir) {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}

fn contains_uproject(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries
        .filter_map(|e| e.ok())
        .any(|e| e.path().extension().is_some_and(|ext| ext == "uproject"))
}
