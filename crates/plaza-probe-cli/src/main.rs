//! Plaza Probe CLI - runtime tests for Nivel 1 (La Plaza)
//!
//! The `plaza-probe` command launches the compiled ActionRoguelike game
//! (not the editor) headlessly and judges the run from its log output.
//!
//! ## Commands
//!
//! - `smoke`: short startup check (default 10 s)
//! - `longrun`: sustained stability run with repetition analysis (default 30 s)

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use plaza_probe::report::render_metrics;
use plaza_probe::{
    init_tracing, resolve_executable, run_probe, save_log, write_json_report, Invocation,
    LineObserver, ProbeConfig, ProbeError, RunKind, RunReport,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{warn, Level};

#[derive(Parser)]
#[command(name = "plaza-probe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Runtime probes for Nivel 1 - La Plaza (ActionRoguelike)", long_about = None)]
#[command(after_help = "Examples:
  plaza-probe smoke
  plaza-probe smoke --timeout 30 --verbose
  plaza-probe longrun --duration 120 --save-log
  PLAZA_EXECUTABLE=/path/to/ActionRoguelike plaza-probe smoke")]
struct Cli {
    /// Emit JSON-formatted diagnostic log lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Short startup check: the game starts and shuts down cleanly
    Smoke {
        /// Timeout in seconds
        #[arg(short, long, default_value_t = 10)]
        timeout: u64,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Extended stability run: no recurring errors or log spam over time
    Longrun {
        /// Duration in seconds
        #[arg(short, long, default_value_t = 30)]
        duration: u64,

        /// Occurrences of one normalized line that count as a repetition storm
        #[arg(long)]
        repeat_threshold: Option<usize>,

        #[command(flatten)]
        common: CommonArgs,
    },
}

impl Commands {
    fn common(&self) -> &CommonArgs {
        match self {
            Commands::Smoke { common, .. } | Commands::Longrun { common, .. } => common,
        }
    }
}

#[derive(Args, Clone, Debug)]
struct CommonArgs {
    /// Specific map to load
    #[arg(short, long)]
    map: Option<String>,

    /// Path to the game executable (overrides PLAZA_EXECUTABLE)
    #[arg(short, long)]
    executable: Option<PathBuf>,

    /// Stream captured output to the console
    #[arg(short, long)]
    verbose: bool,

    /// Save the captured log even when the run passes
    #[arg(short, long)]
    save_log: bool,

    /// Directory for saved logs
    #[arg(long, env = "PLAZA_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Seconds to wait for a voluntary exit before killing the game
    #[arg(long)]
    grace: Option<u64>,

    /// Also write a JSON run report to this path
    #[arg(long)]
    json_report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.command.common().verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.log_json, level);

    let config = ProbeConfig::from_env().context("Invalid PLAZA_* environment")?;

    let passed = match cli.command {
        Commands::Smoke { timeout, common } => {
            cmd_probe(RunKind::Smoke, timeout, None, &common, config).await?
        }
        Commands::Longrun {
            duration,
            repeat_threshold,
            common,
        } => cmd_probe(RunKind::LongRun, duration, repeat_threshold, &common, config).await?,
    };

    Ok(if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Fold command-line overrides into the environment config.
fn apply_overrides(
    mut config: ProbeConfig,
    common: &CommonArgs,
    repeat_threshold: Option<usize>,
) -> Result<ProbeConfig> {
    if let Some(dir) = &common.log_dir {
        config = config.with_log_dir(dir.clone());
    }
    if let Some(secs) = common.grace {
        config = config.with_grace(Duration::from_secs(secs));
    }
    if let Some(threshold) = repeat_threshold {
        config = config.with_repeat_threshold(threshold)?;
    }
    Ok(config)
}

fn banner_width(kind: RunKind) -> usize {
    match kind {
        RunKind::Smoke => 60,
        RunKind::LongRun => 70,
    }
}

fn banner_title(kind: RunKind) -> &'static str {
    match kind {
        RunKind::Smoke => "PLAZA SMOKE TEST - Nivel 1: La Plaza",
        RunKind::LongRun => "PLAZA LONG RUN TEST - Nivel 1: La Plaza (Stability Validation)",
    }
}

/// Console echo of captured lines.
///
/// Smoke runs echo every line; long runs print a progress line every
/// [`ConsoleTap::PROGRESS_EVERY`] lines.
struct ConsoleTap {
    kind: RunKind,
    verbose: bool,
    seen: usize,
}

impl ConsoleTap {
    const PROGRESS_EVERY: usize = 100;

    fn new(kind: RunKind, verbose: bool) -> Self {
        Self {
            kind,
            verbose,
            seen: 0,
        }
    }

    fn render(&mut self, line: &str, elapsed: Duration) -> Option<String> {
        self.seen += 1;
        if !self.verbose {
            return None;
        }
        match self.kind {
            RunKind::Smoke => Some(format!("  {}", line)),
            RunKind::LongRun if self.seen % Self::PROGRESS_EVERY == 0 => Some(format!(
                "  [{}s] Lines: {}",
                elapsed.as_secs(),
                self.seen
            )),
            RunKind::LongRun => None,
        }
    }
}

impl LineObserver for ConsoleTap {
    fn observe(&mut self, line: &str, elapsed: Duration) {
        if let Some(out) = self.render(line, elapsed) {
            println!("{}", out);
        }
    }
}

/// Run one probe and print its report. Returns whether the run passed.
async fn cmd_probe(
    kind: RunKind,
    seconds: u64,
    repeat_threshold: Option<usize>,
    common: &CommonArgs,
    config: ProbeConfig,
) -> Result<bool> {
    let config = apply_overrides(config, common, repeat_threshold)?;
    let rule = "=".repeat(banner_width(kind));
    let divider = "-".repeat(banner_width(kind));

    println!("{}", rule);
    println!("{}", banner_title(kind));
    println!("{}", rule);
    println!("Timestamp: {}", Local::now().to_rfc3339());
    println!();

    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let executable = match resolve_executable(
        common.executable.as_deref(),
        config.executable.as_deref(),
        &cwd,
    ) {
        Ok(path) => path,
        Err(ProbeError::ExecutableNotResolved { searched }) => {
            print_not_resolved(&searched);
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };

    let invocation = Invocation::from_config(kind, executable, &config)
        .with_duration(Duration::from_secs(seconds))
        .with_map(common.map.clone());

    println!("Executable: {}", invocation.executable.display());
    match kind {
        RunKind::Smoke => println!("Timeout: {}s", seconds),
        RunKind::LongRun => println!("Duration: {}s", seconds),
    }
    if let Some(map) = &invocation.map {
        println!("Map: {}", map);
    }
    if common.verbose {
        println!("Executing: {}", invocation.command_line());
    }
    println!();

    println!("Starting {} test...", kind.name());
    println!("{}", divider);

    let mut tap = ConsoleTap::new(kind, common.verbose);
    let run = match run_probe(&invocation, config.repeat_threshold, &mut tap).await {
        Ok(run) => run,
        Err(e) => {
            println!("{}", divider);
            println!();
            if e.is_not_found() {
                println!("ERROR: {}", e);
            } else {
                println!("ERROR: Execution error: {}", e);
            }
            println!();
            println!("{}", rule);
            println!("RESULT: FAIL");
            println!("{}", rule);
            return Ok(false);
        }
    };

    println!("{}", divider);
    println!();
    println!("{}", run.verdict.summary_text());
    println!();

    let mut log_file = None;
    if run.should_save_log(common.save_log) {
        match save_log(&config.log_dir, kind, &run.lines, Local::now()) {
            Ok(path) => {
                println!("Log saved to: {}", path.display());
                log_file = Some(path);
            }
            Err(e) => warn!(error = %e, "failed to save run log"),
        }
    }

    if let Some(path) = &common.json_report {
        write_json_report(path, &RunReport::from_run(&run, log_file))
            .with_context(|| format!("Failed to write JSON report to {}", path.display()))?;
        println!("Report written to: {}", path.display());
    }

    if kind == RunKind::LongRun {
        println!();
        for line in render_metrics(
            &run.counters,
            run.verdict.exit_code,
            run.outcome.elapsed,
            run.outcome.idle_warnings,
        ) {
            println!("{}", line);
        }
    }

    println!();
    println!("{}", rule);
    let verdict_line = match (kind, run.passed()) {
        (RunKind::Smoke, true) => "RESULT: PASS",
        (RunKind::Smoke, false) => "RESULT: FAIL",
        (RunKind::LongRun, true) => "RESULT: PASS - System stable for extended run",
        (RunKind::LongRun, false) => "RESULT: FAIL - Stability issues detected",
    };
    println!("{}", verdict_line);
    println!("{}", rule);

    Ok(run.passed())
}

fn print_not_resolved(searched: &[PathBuf]) {
    println!("ERROR: Could not find game executable!");
    println!();
    println!("Please either:");
    println!("  1. Set PLAZA_EXECUTABLE environment variable");
    println!("  2. Use --executable /path/to/ActionRoguelike");
    println!("  3. Run from repository root with compiled game");
    println!();
    println!("Searched locations:");
    for path in searched {
        println!("  - {}", path.display());
    }
}
