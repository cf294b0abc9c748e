//! Verdict reduction: pass/fail plus the ordered summary.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::classifier::{ClassificationCounters, RepetitivePattern};
use crate::invocation::RunKind;
use crate::supervisor::ProcessOutcome;

/// Exit codes that never fail a run on their own: clean exit, and the codes
/// produced by our own SIGTERM / SIGKILL (raw signal or shell-style 128+N).
pub const ACCEPTED_EXIT_CODES: &[i32] = &[0, -15, -9, 143, 137];

/// Repetitive patterns listed in the summary.
pub const MAX_LISTED_REPETITIONS: usize = 5;

/// Whether `code` is acceptable for either run kind.
pub fn is_accepted_exit_code(code: i32) -> bool {
    ACCEPTED_EXIT_CODES.contains(&code)
}

/// One observation made while reducing a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    /// Failure rules matched.
    CriticalErrors {
        total: usize,
        by_pattern: Vec<(String, usize)>,
        samples: Vec<String>,
    },

    /// Normalized lines recurred past the threshold.
    RepetitivePatterns { patterns: Vec<RepetitivePattern> },

    /// The child exited with a code outside [`ACCEPTED_EXIT_CODES`].
    UnexpectedExitCode { code: i32 },

    /// No success rule matched.
    NoSuccessIndicators,

    /// Warning rules matched.
    Warnings {
        total: usize,
        by_category: Vec<(String, usize)>,
    },
}

impl Finding {
    /// Whether this finding fails the run.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Finding::CriticalErrors { .. }
                | Finding::RepetitivePatterns { .. }
                | Finding::UnexpectedExitCode { .. }
        )
    }
}

/// Final decision for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub passed: bool,
    pub exit_code: i32,
    pub elapsed: Duration,
    pub findings: Vec<Finding>,
    pub summary: Vec<String>,
}

impl Verdict {
    /// Failing findings only.
    pub fn failures(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.is_failure())
    }

    /// Summary lines joined with newlines.
    pub fn summary_text(&self) -> String {
        self.summary.join("\n")
    }
}

/// Verdict reducer.
pub struct VerdictReducer;

impl VerdictReducer {
    /// Reduce finalized counters and the process outcome to a verdict.
    ///
    /// Rules, all evaluated:
    /// 1. any failure-rule match fails the run
    /// 2. any repetitive pattern fails the run (long run only)
    /// 3. an exit code outside [`ACCEPTED_EXIT_CODES`] fails the run
    /// 4. no success indicator is reported, not failed
    /// 5. warnings are reported, not failed
    pub fn evaluate(
        kind: RunKind,
        counters: &ClassificationCounters,
        outcome: &ProcessOutcome,
        target: Duration,
    ) -> Verdict {
        let mut findings = Vec::new();

        if counters.errors > 0 {
            findings.push(Finding::CriticalErrors {
                total: counters.errors,
                by_pattern: counters
                    .error_breakdown
                    .iter()
                    .map(|(k, v)| (k.clone(), *v))
                    .collect(),
                samples: counters.error_samples.clone(),
            });
        }

        if kind.tracks_repetition() && !counters.repetitive.is_empty() {
            findings.push(Finding::RepetitivePatterns {
                patterns: counters.repetitive.clone(),
            });
        }

        if !is_accepted_exit_code(outcome.exit_code) {
            findings.push(Finding::UnexpectedExitCode {
                code: outcome.exit_code,
            });
        }

        if counters.successes == 0 {
            findings.push(Finding::NoSuccessIndicators);
        }

        if counters.warnings > 0 {
            findings.push(Finding::Warnings {
                total: counters.warnings,
                by_category: counters
                    .warning_breakdown
                    .iter()
                    .map(|(k, v)| (k.clone(), *v))
                    .collect(),
            });
        }

        let passed = !findings.iter().any(Finding::is_failure);
        let summary = render_summary(kind, passed, &findings, counters, outcome, target);

        Verdict {
            passed,
            exit_code: outcome.exit_code,
            elapsed: outcome.elapsed,
            findings,
            summary,
        }
    }
}

fn render_summary(
    kind: RunKind,
    passed: bool,
    findings: &[Finding],
    counters: &ClassificationCounters,
    outcome: &ProcessOutcome,
    target: Duration,
) -> Vec<String> {
    let status = if passed { "PASS" } else { "FAIL" };
    let mut lines = vec![format!("{}: {}", kind.title(), status)];

    for finding in findings.iter().filter(|f| f.is_failure()) {
        render_finding(kind, finding, &mut lines);
    }

    if counters.successes > 0 {
        lines.push(format!("SUCCESS INDICATORS: {} found", counters.successes));
    }
    for finding in findings.iter().filter(|f| !f.is_failure()) {
        render_finding(kind, finding, &mut lines);
    }

    if let Some(err) = &outcome.read_error {
        lines.push(format!("READ ERROR: {} (output truncated)", err));
    }
    lines.push(format!(
        "DURATION: {:.1}s (target: {}s)",
        outcome.elapsed.as_secs_f64(),
        target.as_secs()
    ));
    lines.push(format!("LOG LINES: {}", counters.lines));
    lines
}

fn render_finding(kind: RunKind, finding: &Finding, lines: &mut Vec<String>) {
    match finding {
        Finding::CriticalErrors {
            total,
            by_pattern,
            samples,
        } => {
            lines.push(format!("ERRORS: {} critical errors", total));
            for (pattern, count) in by_pattern {
                lines.push(format!("  - {}: {}", pattern, count));
            }
            for sample in samples {
                lines.push(format!("  > {}", sample));
            }
        }
        Finding::RepetitivePatterns { patterns } => {
            lines.push(format!(
                "REPETITIVE PATTERNS: {} problematic",
                patterns.len()
            ));
            for pattern in patterns.iter().take(MAX_LISTED_REPETITIONS) {
                lines.push(format!("  - {}", pattern.describe()));
            }
        }
        Finding::UnexpectedExitCode { code } => {
            lines.push(format!("EXIT CODE: {} (unexpected)", code));
        }
        Finding::NoSuccessIndicators => {
            lines.push("WARNING: No success indicators found in log".to_string());
        }
        Finding::Warnings { total, by_category } => {
            lines.push(format!("WARNINGS: {} total", total));
            if kind == RunKind::LongRun {
                for (category, count) in by_category {
                    lines.push(format!("  - {}: {}", category, count));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classifier;
    use crate::supervisor::Termination;

    fn outcome(exit_code: i32) -> ProcessOutcome {
        ProcessOutcome {
            exit_code,
            elapsed: Duration::from_millis(10_200),
            termination: Termination::Terminated,
            deadline_reached: true,
            lines: 0,
            read_error: None,
            idle_warnings: 0,
        }
    }

    fn counters_for(kind: RunKind, lines: &[&str]) -> ClassificationCounters {
        let mut classifier = Classifier::for_kind(kind, 10);
        for line in lines {
            classifier.classify(line);
        }
        classifier.finish()
    }

    fn evaluate(kind: RunKind, lines: &[&str], exit_code: i32) -> Verdict {
        let counters = counters_for(kind, lines);
        VerdictReducer::evaluate(kind, &counters, &outcome(exit_code), Duration::from_secs(10))
    }

    #[test]
    fn test_clean_run_passes() {
        let verdict = evaluate(RunKind::Smoke, &["LogInit: Engine is starting"], 0);
        assert!(verdict.passed);
        assert!(verdict.findings.is_empty());
        assert_eq!(verdict.summary[0], "SMOKE TEST: PASS");
        assert!(verdict.summary.contains(&"SUCCESS INDICATORS: 1 found".to_string()));
    }

    #[test]
    fn test_single_fatal_error_fails() {
        let verdict = evaluate(
            RunKind::Smoke,
            &["LogInit: Engine is starting", "Fatal error: access violation"],
            0,
        );
        assert!(!verdict.passed);
        match &verdict.findings[0] {
            Finding::CriticalErrors {
                total, by_pattern, ..
            } => {
                assert_eq!(*total, 1);
                assert_eq!(by_pattern, &vec![("Fatal error".to_string(), 1)]);
            }
            other => panic!("unexpected finding: {other:?}"),
        }
        assert!(verdict.summary.contains(&"  - Fatal error: 1".to_string()));
    }

    #[test]
    fn test_accepted_exit_codes_never_fail_alone() {
        for kind in [RunKind::Smoke, RunKind::LongRun] {
            for code in ACCEPTED_EXIT_CODES {
                let verdict = evaluate(kind, &["LogInit: Engine is starting"], *code);
                assert!(verdict.passed, "{kind:?} code {code} should pass");
            }
        }
    }

    #[test]
    fn test_unexpected_exit_code_fails_without_errors() {
        for kind in [RunKind::Smoke, RunKind::LongRun] {
            for code in [1, 2, -11, 134, 255] {
                let verdict = evaluate(kind, &["LogInit: Engine is starting"], code);
                assert!(!verdict.passed, "{kind:?} code {code} should fail");
                assert_eq!(
                    verdict.findings,
                    vec![Finding::UnexpectedExitCode { code }]
                );
            }
        }
    }

    #[test]
    fn test_all_failures_are_reported_together() {
        let mut lines = vec!["Assertion failed: x"];
        lines.extend(std::iter::repeat("LogAI: invalid nav mesh").take(10));
        let verdict = evaluate(RunKind::LongRun, &lines, 1);

        assert!(!verdict.passed);
        assert_eq!(verdict.failures().count(), 3);
        let errors_at = verdict.summary.iter().position(|l| l.starts_with("ERRORS"));
        let repeat_at = verdict
            .summary
            .iter()
            .position(|l| l.starts_with("REPETITIVE"));
        let exit_at = verdict.summary.iter().position(|l| l.starts_with("EXIT CODE"));
        assert!(errors_at < repeat_at && repeat_at < exit_at);
    }

    #[test]
    fn test_missing_success_indicators_only_warn() {
        let verdict = evaluate(RunKind::Smoke, &["LogTemp: hello"], 0);
        assert!(verdict.passed);
        assert_eq!(verdict.findings, vec![Finding::NoSuccessIndicators]);
        assert!(verdict
            .summary
            .contains(&"WARNING: No success indicators found in log".to_string()));
    }

    #[test]
    fn test_warnings_only_inform() {
        let verdict = evaluate(
            RunKind::LongRun,
            &["LogInit: Engine is starting", "LogNet: Warning: jitter"],
            0,
        );
        assert!(verdict.passed);
        assert!(verdict.summary.contains(&"WARNINGS: 1 total".to_string()));
        assert!(verdict.summary.contains(&"  - LogNet: 1".to_string()));
    }

    #[test]
    fn test_repetition_fails_long_run_without_failure_rule() {
        let lines: Vec<String> = (0..10)
            .map(|i| format!("LogStreaming: error loading chunk {i}"))
            .collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let verdict = evaluate(RunKind::LongRun, &refs, 0);

        assert!(!verdict.passed);
        assert!(matches!(
            verdict.findings[0],
            Finding::RepetitivePatterns { .. }
        ));
        assert!(verdict
            .summary
            .iter()
            .any(|l| l == "  - 10x: LogStreaming: error loading chunk N"));
    }

    #[test]
    fn test_repetitions_listed_up_to_five() {
        let mut lines = Vec::new();
        for kind in 0..7 {
            let letter = (b'a' + kind) as char;
            for _ in 0..10 {
                lines.push(format!("{letter}: failed"));
            }
        }
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let verdict = evaluate(RunKind::LongRun, &refs, 0);
        assert!(verdict
            .summary
            .contains(&"REPETITIVE PATTERNS: 7 problematic".to_string()));
        let listed = verdict
            .summary
            .iter()
            .filter(|l| l.starts_with("  - 10x"))
            .count();
        assert_eq!(listed, MAX_LISTED_REPETITIONS);
    }

    #[test]
    fn test_read_error_reported_with_partial_capture() {
        let counters = counters_for(
            RunKind::Smoke,
            &["LogInit: Engine is starting", "Fatal error: access violation"],
        );
        let outcome = ProcessOutcome {
            read_error: Some("pipe broke".to_string()),
            deadline_reached: false,
            lines: 2,
            ..outcome(-15)
        };
        let verdict =
            VerdictReducer::evaluate(RunKind::Smoke, &counters, &outcome, Duration::from_secs(10));

        assert!(!verdict.passed);
        assert_eq!(counters.lines, 2);
        assert!(matches!(
            verdict.findings[0],
            Finding::CriticalErrors { total: 1, .. }
        ));
        let n = verdict.summary.len();
        assert_eq!(verdict.summary[n - 3], "READ ERROR: pipe broke (output truncated)");
        assert_eq!(verdict.summary[n - 1], "LOG LINES: 2");
    }

    #[test]
    fn test_summary_footer() {
        let verdict = evaluate(RunKind::Smoke, &["LogInit: Engine is starting"], 0);
        let n = verdict.summary.len();
        assert_eq!(verdict.summary[n - 2], "DURATION: 10.2s (target: 10s)");
        assert_eq!(verdict.summary[n - 1], "LOG LINES: 1");
        assert_eq!(verdict.elapsed, Duration::from_millis(10_200));
    }
}
