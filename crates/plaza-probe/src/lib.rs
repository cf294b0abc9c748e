//! Plaza Probe - runtime validation for the ActionRoguelike game build
//!
//! Launches the packaged game headlessly and decides pass/fail from its log:
//! - Supervises the process under a wall-clock deadline (terminate, grace, kill)
//! - Classifies every output line against static success/failure/warning rules
//! - Flags repetition storms on long runs
//! - Reduces the run to a verdict with a human-readable summary

pub mod classifier;
pub mod config;
pub mod error;
pub mod invocation;
pub mod locate;
pub mod obs;
pub mod patterns;
pub mod probe;
pub mod report;
pub mod supervisor;
pub mod telemetry;
pub mod verdict;

// Re-export key types
pub use classifier::{normalize, ClassificationCounters, Classifier, RepetitivePattern};
pub use config::ProbeConfig;
pub use error::{ProbeError, ProbeResult};
pub use invocation::{Invocation, RunKind, LAUNCH_FLAGS};
pub use locate::resolve_executable;
pub use probe::{run_probe, ProbeRun};
pub use report::{render_metrics, save_log, write_json_report, RunReport};
pub use supervisor::{LineObserver, ProcessOutcome, Supervisor, Termination};
pub use telemetry::init_tracing;
pub use verdict::{Finding, Verdict, VerdictReducer, ACCEPTED_EXIT_CODES};
