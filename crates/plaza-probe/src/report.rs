//! Run artifacts: the captured log file, the JSON run report and the
//! long-run metrics block.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::classifier::ClassificationCounters;
use crate::error::ProbeResult;
use crate::invocation::RunKind;
use crate::probe::ProbeRun;
use crate::supervisor::Termination;
use crate::verdict::Finding;

pub const REPORT_SCHEMA_VERSION: &str = "1.0";

/// File name for a saved log: `<prefix>_<YYYYmmdd_HHMMSS>.log`.
pub fn log_file_name(kind: RunKind, at: DateTime<Local>) -> String {
    format!("{}_{}.log", kind.log_prefix(), at.format("%Y%m%d_%H%M%S"))
}

/// Write the captured lines, newline-joined, under `dir`.
pub fn save_log(
    dir: &Path,
    kind: RunKind,
    lines: &[String],
    at: DateTime<Local>,
) -> ProbeResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(log_file_name(kind, at));
    std::fs::write(&path, lines.join("\n"))?;
    info!(path = %path.display(), lines = lines.len(), "run log saved");
    Ok(path)
}

/// Machine-readable summary of one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub run_id: String,
    pub kind: RunKind,
    pub executable: PathBuf,
    pub map: Option<String>,
    pub target_secs: u64,
    pub passed: bool,
    pub exit_code: i32,
    pub elapsed_ms: u64,
    pub termination: Termination,
    pub idle_warnings: u32,
    pub counters: ClassificationCounters,
    pub findings: Vec<Finding>,
    pub log_file: Option<PathBuf>,
}

impl RunReport {
    pub fn from_run(run: &ProbeRun, log_file: Option<PathBuf>) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            run_id: run.run_id.clone(),
            kind: run.invocation.kind,
            executable: run.invocation.executable.clone(),
            map: run.invocation.map.clone(),
            target_secs: run.invocation.duration.as_secs(),
            passed: run.verdict.passed,
            exit_code: run.verdict.exit_code,
            elapsed_ms: run.outcome.elapsed.as_millis() as u64,
            termination: run.outcome.termination,
            idle_warnings: run.outcome.idle_warnings,
            counters: run.counters.clone(),
            findings: run.verdict.findings.clone(),
            log_file,
        }
    }
}

/// Write the run report as pretty JSON.
pub fn write_json_report(path: &Path, report: &RunReport) -> ProbeResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(report)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Metrics block printed after a long run.
pub fn render_metrics(
    counters: &ClassificationCounters,
    exit_code: i32,
    elapsed: Duration,
    idle_warnings: u32,
) -> Vec<String> {
    vec![
        "METRICS SUMMARY:".to_string(),
        format!("  - Errors: {}", counters.errors),
        format!("  - Warnings: {}", counters.warnings),
        format!("  - Success Indicators: {}", counters.successes),
        format!("  - Duration: {:.1}s", elapsed.as_secs_f64()),
        format!("  - Exit Code: {}", exit_code),
        format!("  - Idle Warnings: {}", idle_warnings),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fixed_time() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2026, 3, 14, 9, 26, 53)
            .single()
            .expect("unambiguous local time")
    }

    #[test]
    fn test_log_file_name_embeds_prefix_and_timestamp() {
        assert_eq!(
            log_file_name(RunKind::Smoke, fixed_time()),
            "plaza_smoke_20260314_092653.log"
        );
        assert_eq!(
            log_file_name(RunKind::LongRun, fixed_time()),
            "plaza_longrun_20260314_092653.log"
        );
    }

    #[test]
    fn test_save_log_creates_dir_and_keeps_order() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested/logs");
        let lines = vec!["first".to_string(), "second".to_string()];

        let path = save_log(&dir, RunKind::Smoke, &lines, fixed_time()).unwrap();
        assert!(path.starts_with(&dir));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond");
    }

    #[test]
    fn test_metrics_block() {
        let counters = ClassificationCounters {
            errors: 2,
            warnings: 5,
            successes: 3,
            ..Default::default()
        };
        let block = render_metrics(&counters, -15, Duration::from_millis(30_400), 1);
        assert_eq!(block[0], "METRICS SUMMARY:");
        assert!(block.contains(&"  - Errors: 2".to_string()));
        assert!(block.contains(&"  - Duration: 30.4s".to_string()));
        assert!(block.contains(&"  - Exit Code: -15".to_string()));
    }
}
