//! One probe run end to end: supervise, classify, reduce.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::classifier::{ClassificationCounters, Classifier};
use crate::error::ProbeResult;
use crate::invocation::Invocation;
use crate::obs;
use crate::supervisor::{LineObserver, ProcessOutcome, Supervisor};
use crate::verdict::{Verdict, VerdictReducer};

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct ProbeRun {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub invocation: Invocation,
    pub outcome: ProcessOutcome,
    pub counters: ClassificationCounters,
    pub verdict: Verdict,

    /// Captured lines in arrival order.
    pub lines: Vec<String>,
}

impl ProbeRun {
    pub fn passed(&self) -> bool {
        self.verdict.passed
    }

    /// Failing runs always keep their log; passing runs only on request.
    pub fn should_save_log(&self, requested: bool) -> bool {
        requested || !self.passed()
    }
}

/// Fans each line out to the classifier, the capture buffer and the caller.
struct RunRecorder<'a> {
    classifier: Classifier,
    lines: Vec<String>,
    tap: &'a mut dyn LineObserver,
}

impl LineObserver for RunRecorder<'_> {
    fn observe(&mut self, line: &str, elapsed: Duration) {
        let class = self.classifier.classify(line);
        if class.failure > 0 {
            obs::emit_failure_line(line);
        }
        self.lines.push(line.to_string());
        self.tap.observe(line, elapsed);
    }
}

/// Execute one probe run.
///
/// `repeat_threshold` only matters for run kinds that track repetition.
/// `tap` sees every line as it is captured (console echo, progress).
///
/// Returns an error only when the run could not start; every run that
/// launched ends in a [`Verdict`].
pub async fn run_probe(
    invocation: &Invocation,
    repeat_threshold: usize,
    tap: &mut dyn LineObserver,
) -> ProbeResult<ProbeRun> {
    let run_id = Uuid::new_v4().to_string();
    let span = obs::run_span(&run_id, invocation.kind.name());

    async move {
        let started_at = Utc::now();
        obs::emit_started(invocation);

        let mut recorder = RunRecorder {
            classifier: Classifier::for_kind(invocation.kind, repeat_threshold),
            lines: Vec::new(),
            tap,
        };

        let outcome = Supervisor::run(invocation, &mut recorder).await?;

        let RunRecorder {
            classifier, lines, ..
        } = recorder;
        let counters = classifier.finish();
        let verdict =
            VerdictReducer::evaluate(invocation.kind, &counters, &outcome, invocation.duration);

        obs::emit_finished(verdict.passed, verdict.exit_code, outcome.elapsed, lines.len());
        info!(
            errors = counters.errors,
            warnings = counters.warnings,
            successes = counters.successes,
            repetitive = counters.repetitive.len(),
            "classification finished"
        );

        Ok(ProbeRun {
            run_id,
            started_at,
            invocation: invocation.clone(),
            outcome,
            counters,
            verdict,
            lines,
        })
    }
    .instrument(span)
    .await
}
