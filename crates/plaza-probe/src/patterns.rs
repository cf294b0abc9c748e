//! Static log rule tables.
//!
//! Each group is a fixed, ordered list of `(label, pattern)` pairs compiled
//! once, case-insensitively. The label is the pattern source so breakdowns
//! read the same as the table.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Lines that show the engine came up.
pub const SUCCESS_PATTERNS: &[&str] = &[
    r"LogInit.*Engine is starting",
    r"LogLoad.*Took .* seconds to LoadMap",
    r"LogWorld.*Bringing World.*up for play",
    r"LogGameMode",
];

/// Lines that fail the run.
pub const FAILURE_PATTERNS: &[&str] = &[
    r"Fatal error",
    r"Ensure condition failed",
    r"Unhandled exception",
    r"Assertion failed",
    r"Crash in runnable thread",
    r"Critical error:",
    r"SIGABRT",
    r"SIGSEGV",
];

/// Lines that are reported but never fail the run.
pub const WARNING_PATTERNS: &[&str] = &[r"Warning:", r"LogError:"];

/// Keywords that make a repeated normalized line suspicious.
const REPETITION_KEYWORDS: &str = r"error|warning|failed|invalid";

/// Log channel token used to bucket warnings (`LogNet`, `LogAI`, ...).
const LOG_CHANNEL: &str = r"(Log\w+)";

/// Which rule table a pattern belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PatternGroup {
    Success,
    Failure,
    Warning,
}

/// One compiled entry of a rule table.
#[derive(Debug)]
pub struct Rule {
    pub label: &'static str,
    pub regex: Regex,
}

impl Rule {
    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }
}

/// The three rule tables plus the auxiliary expressions the classifier needs.
#[derive(Debug)]
pub struct RuleSet {
    pub success: Vec<Rule>,
    pub failure: Vec<Rule>,
    pub warning: Vec<Rule>,
    pub repetition_keywords: Regex,
    pub log_channel: Regex,
}

impl RuleSet {
    /// The built-in rule tables.
    pub fn builtin() -> &'static RuleSet {
        &BUILTIN
    }

    pub fn group(&self, group: PatternGroup) -> &[Rule] {
        match group {
            PatternGroup::Success => &self.success,
            PatternGroup::Failure => &self.failure,
            PatternGroup::Warning => &self.warning,
        }
    }

    /// First log-channel token in `line`, if any.
    pub fn channel_of<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.log_channel
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }
}

static BUILTIN: LazyLock<RuleSet> = LazyLock::new(|| RuleSet {
    success: compile_group(SUCCESS_PATTERNS),
    failure: compile_group(FAILURE_PATTERNS),
    warning: compile_group(WARNING_PATTERNS),
    repetition_keywords: case_insensitive(REPETITION_KEYWORDS),
    // Channel names are case-sensitive: `LogNet`, not `lognet`.
    log_channel: Regex::new(LOG_CHANNEL).expect("log channel pattern is valid"),
});

fn compile_group(patterns: &'static [&'static str]) -> Vec<Rule> {
    patterns
        .iter()
        .map(|p| Rule {
            label: p,
            regex: case_insensitive(p),
        })
        .collect()
}

fn case_insensitive(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("builtin rule patterns are valid")
}
