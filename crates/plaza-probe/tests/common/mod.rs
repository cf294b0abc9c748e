//! Fake game executables for integration tests.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use plaza_probe::{Invocation, RunKind};

/// Write an executable `/bin/sh` script standing in for the game binary.
///
/// The script receives the real launch flags as `$@`.
pub fn fake_game(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write fake game");
    let mut perms = std::fs::metadata(&path).expect("stat fake game").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod fake game");
    path
}

/// Invocation with a short grace window so kill escalation stays fast.
pub fn invocation(kind: RunKind, executable: PathBuf, duration: Duration) -> Invocation {
    Invocation::new(kind, executable)
        .with_duration(duration)
        .with_grace(Duration::from_millis(500))
}

/// Observer that ignores lines.
pub fn ignore(_: &str, _: Duration) {}
