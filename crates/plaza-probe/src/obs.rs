//! Structured lifecycle events for probe runs.
//!
//! Events are emitted through `tracing` with an `event` field so JSON output
//! can be filtered by name. Instrument a run with [`run_span`] to tag every
//! event with its run id.

use std::time::Duration;
use tracing::{info, warn};

use crate::invocation::Invocation;

/// Span tagged with the run id and kind, for `Instrument::instrument`.
pub fn run_span(run_id: &str, kind: &str) -> tracing::Span {
    tracing::info_span!("plaza.probe", run_id = %run_id, kind = %kind)
}

/// Emit event: child launched.
pub fn emit_started(invocation: &Invocation) {
    info!(
        event = "probe.started",
        executable = %invocation.executable.display(),
        duration_secs = invocation.duration.as_secs(),
        map = invocation.map.as_deref().unwrap_or(""),
    );
}

/// Emit event: run deadline expired with the child still supervised.
pub fn emit_deadline(duration: Duration) {
    info!(event = "probe.deadline", duration_secs = duration.as_secs());
}

/// Emit event: no output for the idle window. Observability only.
pub fn emit_idle(silent_for: Duration, lines_so_far: usize) {
    warn!(
        event = "probe.idle",
        silent_ms = silent_for.as_millis() as u64,
        lines = lines_so_far,
        "no output from the game process"
    );
}

/// Emit event: a line matched a failure rule.
pub fn emit_failure_line(line: &str) {
    warn!(event = "probe.failure_line", line = %line);
}

/// Emit event: run reduced to a verdict.
pub fn emit_finished(passed: bool, exit_code: i32, elapsed: Duration, lines: usize) {
    info!(
        event = "probe.finished",
        passed = passed,
        exit_code = exit_code,
        elapsed_ms = elapsed.as_millis() as u64,
        lines = lines,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::RunKind;

    #[test]
    fn test_emitters_do_not_panic_without_subscriber() {
        let _entered = run_span("run-1", "smoke").entered();
        emit_started(&Invocation::new(RunKind::Smoke, "/opt/ActionRoguelike"));
        emit_deadline(Duration::from_secs(10));
        emit_idle(Duration::from_secs(11), 3);
        emit_failure_line("Fatal error: boom");
        emit_finished(false, 1, Duration::from_millis(1500), 42);
    }
}
