//! Streaming log classification.
//!
//! Every line is tested against all three rule groups independently; a line
//! may count as success, failure and warning at once. Long runs additionally
//! normalize each line and count duplicates to expose repetition storms.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;
use std::time::Duration;

use crate::invocation::RunKind;
use crate::patterns::RuleSet;
use crate::supervisor::LineObserver;

/// Failing lines kept verbatim for the report.
pub const MAX_ERROR_SAMPLES: usize = 5;
/// Characters kept per sample line.
pub const SAMPLE_WIDTH: usize = 100;

static HEX_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"0x[0-9a-fA-F]+").expect("hex pattern is valid"));
static DIGIT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("digit pattern is valid"));

/// Collapse addresses and numbers so lines differing only in those compare equal.
///
/// Addresses are replaced first so `0x1A2B` becomes `ADDR` rather than being
/// split up by the digit pass.
pub fn normalize(line: &str) -> String {
    let without_addresses = HEX_ADDRESS.replace_all(line, "ADDR");
    DIGIT_RUN.replace_all(&without_addresses, "N").into_owned()
}

/// A normalized line that recurred at or above the threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepetitivePattern {
    pub normalized: String,
    pub count: usize,
}

impl RepetitivePattern {
    /// One-line rendering: `12x: LogNet: Error ...`.
    pub fn describe(&self) -> String {
        format!("{}x: {}", self.count, truncate(&self.normalized, 80))
    }
}

/// Match counts for a single line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineClass {
    pub success: usize,
    pub failure: usize,
    pub warning: usize,
}

impl LineClass {
    /// True when the line matched no rule at all.
    pub fn is_clean(&self) -> bool {
        self.success == 0 && self.failure == 0 && self.warning == 0
    }
}

/// Accumulated classification state for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassificationCounters {
    /// Lines seen, matching or not.
    pub lines: usize,

    /// Total failure-rule matches.
    pub errors: usize,

    /// Total warning-rule matches.
    pub warnings: usize,

    /// Total success-rule matches.
    pub successes: usize,

    /// Failure pattern -> matches.
    pub error_breakdown: BTreeMap<String, usize>,

    /// Log channel (or pattern, when the line has none) -> warning matches.
    pub warning_breakdown: BTreeMap<String, usize>,

    /// First failing lines, truncated.
    pub error_samples: Vec<String>,

    /// Whether repetition analysis ran for this run.
    pub repetition_tracked: bool,

    /// Suspicious normalized lines at or above the threshold, first-seen order.
    pub repetitive: Vec<RepetitivePattern>,
}

#[derive(Debug, Default)]
struct RepetitionTracker {
    threshold: usize,
    counts: HashMap<String, (usize, usize)>,
}

impl RepetitionTracker {
    fn new(threshold: usize) -> Self {
        Self {
            threshold,
            counts: HashMap::new(),
        }
    }

    fn record(&mut self, line: &str) {
        let next_order = self.counts.len();
        let entry = self.counts.entry(normalize(line)).or_insert((0, next_order));
        entry.0 += 1;
    }

    fn flagged(self, rules: &RuleSet) -> Vec<RepetitivePattern> {
        let threshold = self.threshold;
        let mut flagged: Vec<(usize, RepetitivePattern)> = self
            .counts
            .into_iter()
            .filter(|(normalized, (count, _))| {
                *count >= threshold && rules.repetition_keywords.is_match(normalized)
            })
            .map(|(normalized, (count, order))| (order, RepetitivePattern { normalized, count }))
            .collect();
        flagged.sort_by_key(|(order, _)| *order);
        flagged.into_iter().map(|(_, p)| p).collect()
    }
}

/// Incremental classifier over a line stream.
#[derive(Debug)]
pub struct Classifier {
    rules: &'static RuleSet,
    counters: ClassificationCounters,
    repetition: Option<RepetitionTracker>,
}

impl Classifier {
    /// Classifier without repetition tracking.
    pub fn new() -> Self {
        Self {
            rules: RuleSet::builtin(),
            counters: ClassificationCounters::default(),
            repetition: None,
        }
    }

    /// Classifier that also flags normalized lines seen `threshold` times.
    pub fn with_repetition(threshold: usize) -> Self {
        let mut classifier = Self::new();
        classifier.counters.repetition_tracked = true;
        classifier.repetition = Some(RepetitionTracker::new(threshold));
        classifier
    }

    /// Classifier configured for a run kind.
    pub fn for_kind(kind: RunKind, repeat_threshold: usize) -> Self {
        if kind.tracks_repetition() {
            Self::with_repetition(repeat_threshold)
        } else {
            Self::new()
        }
    }

    /// Classify one line and fold it into the counters.
    pub fn classify(&mut self, line: &str) -> LineClass {
        let rules = self.rules;
        let counters = &mut self.counters;
        let mut class = LineClass::default();

        counters.lines += 1;

        class.success = rules.success.iter().filter(|r| r.is_match(line)).count();
        counters.successes += class.success;

        for rule in rules.failure.iter().filter(|r| r.is_match(line)) {
            counters.errors += 1;
            *counters
                .error_breakdown
                .entry(rule.label.to_string())
                .or_default() += 1;
            class.failure += 1;
        }
        if class.failure > 0 && counters.error_samples.len() < MAX_ERROR_SAMPLES {
            counters.error_samples.push(truncate(line, SAMPLE_WIDTH));
        }

        for rule in rules.warning.iter().filter(|r| r.is_match(line)) {
            counters.warnings += 1;
            let bucket = rules.channel_of(line).unwrap_or(rule.label);
            *counters
                .warning_breakdown
                .entry(bucket.to_string())
                .or_default() += 1;
            class.warning += 1;
        }

        if let Some(tracker) = self.repetition.as_mut() {
            tracker.record(line);
        }

        class
    }

    /// Counters so far (repetition is only resolved by [`Classifier::finish`]).
    pub fn counters(&self) -> &ClassificationCounters {
        &self.counters
    }

    /// Finalize the run's counters.
    pub fn finish(self) -> ClassificationCounters {
        let mut counters = self.counters;
        if let Some(tracker) = self.repetition {
            counters.repetitive = tracker.flagged(self.rules);
        }
        counters
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LineObserver for Classifier {
    fn observe(&mut self, line: &str, _elapsed: Duration) {
        self.classify(line);
    }
}

/// Truncate to at most `max` characters on a char boundary.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_all(classifier: &mut Classifier, lines: &[&str]) {
        for line in lines {
            classifier.classify(line);
        }
    }

    #[test]
    fn test_unmatched_lines_leave_counters_untouched() {
        let mut classifier = Classifier::new();
        let class = classifier.classify("LogTemp: Display: spawned 12 pigeons");
        assert!(class.is_clean());

        let counters = classifier.finish();
        assert_eq!(counters.lines, 1);
        assert_eq!(counters.errors, 0);
        assert_eq!(counters.warnings, 0);
        assert_eq!(counters.successes, 0);
        assert!(counters.error_breakdown.is_empty());
        assert!(counters.warning_breakdown.is_empty());
        assert!(counters.error_samples.is_empty());
    }

    #[test]
    fn test_failure_and_warning_on_same_line() {
        let mut classifier = Classifier::new();
        let class = classifier.classify("LogCore: Warning: Fatal error in worker");
        assert_eq!(class.failure, 1);
        assert_eq!(class.warning, 1);

        let counters = classifier.finish();
        assert_eq!(counters.errors, 1);
        assert_eq!(counters.error_breakdown.get("Fatal error"), Some(&1));
        assert_eq!(counters.warnings, 1);
        assert_eq!(counters.warning_breakdown.get("LogCore"), Some(&1));
    }

    #[test]
    fn test_warning_without_channel_buckets_by_pattern() {
        let mut classifier = Classifier::new();
        classifier.classify("Warning: shader cache miss");
        let counters = classifier.finish();
        assert_eq!(counters.warning_breakdown.get("Warning:"), Some(&1));
    }

    #[test]
    fn test_success_indicators_counted() {
        let mut classifier = Classifier::new();
        classify_all(
            &mut classifier,
            &[
                "LogInit: Display: Engine is starting up",
                "LogWorld: Bringing World /Game/Maps/Plaza.Plaza up for play",
                "LogGameMode: Display: Match State Changed",
            ],
        );
        assert_eq!(classifier.counters().successes, 3);
    }

    #[test]
    fn test_error_samples_are_capped_and_truncated() {
        let mut classifier = Classifier::new();
        let long = format!("Fatal error: {}", "x".repeat(300));
        for _ in 0..8 {
            classifier.classify(&long);
        }
        let counters = classifier.finish();
        assert_eq!(counters.errors, 8);
        assert_eq!(counters.error_samples.len(), MAX_ERROR_SAMPLES);
        assert_eq!(counters.error_samples[0].chars().count(), SAMPLE_WIDTH);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let lines = [
            "LogInit: Engine is starting",
            "LogNet: Warning: slow tick 42",
            "Assertion failed: ptr != nullptr",
            "nothing to see",
        ];
        let mut a = Classifier::with_repetition(10);
        let mut b = Classifier::with_repetition(10);
        classify_all(&mut a, &lines);
        classify_all(&mut b, &lines);
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let first = normalize("Error at 0x1A2B3F line 42");
        assert_eq!(first, "Error at ADDR line N");
        assert_eq!(normalize("Error at 0x1A2B3F line 42"), first);
        assert_eq!(normalize("Error at 0xdeadbeef line 7"), first);
    }

    #[test]
    fn test_repetition_flags_keyword_lines_at_threshold() {
        let mut classifier = Classifier::with_repetition(10);
        for i in 0..10 {
            classifier.classify(&format!("LogAI: pathing error for agent {i}"));
        }
        for i in 0..20 {
            classifier.classify(&format!("LogTemp: tick {i}"));
        }
        let counters = classifier.finish();

        assert_eq!(counters.errors, 0);
        assert_eq!(counters.repetitive.len(), 1);
        assert_eq!(counters.repetitive[0].count, 10);
        assert_eq!(
            counters.repetitive[0].normalized,
            "LogAI: pathing error for agent N"
        );
    }

    #[test]
    fn test_repetition_below_threshold_not_flagged() {
        let mut classifier = Classifier::with_repetition(10);
        for _ in 0..9 {
            classifier.classify("LogAI: invalid target");
        }
        assert!(classifier.finish().repetitive.is_empty());
    }

    #[test]
    fn test_repetition_keeps_first_seen_order() {
        let mut earlier = Classifier::with_repetition(2);
        earlier.classify("first: invalid handle");
        earlier.classify("second: load failed");
        earlier.classify("first: invalid handle");
        earlier.classify("second: load failed");

        let flagged: Vec<String> = earlier
            .finish()
            .repetitive
            .into_iter()
            .map(|p| p.normalized)
            .collect();
        assert_eq!(flagged, vec!["first: invalid handle", "second: load failed"]);
    }

    #[test]
    fn test_smoke_classifier_skips_repetition() {
        let mut classifier = Classifier::for_kind(RunKind::Smoke, 10);
        for _ in 0..50 {
            classifier.classify("LogAI: error spam");
        }
        let counters = classifier.finish();
        assert!(!counters.repetition_tracked);
        assert!(counters.repetitive.is_empty());
    }

    #[test]
    fn test_describe_truncates() {
        let pattern = RepetitivePattern {
            normalized: "e".repeat(200),
            count: 12,
        };
        let text = pattern.describe();
        assert!(text.starts_with("12x: "));
        assert_eq!(text.len(), "12x: ".len() + 80);
    }
}
