//! Deadline-bounded supervision of the game process.
//!
//! On unix the child's stdout and stderr share one pipe, so lines reach the
//! [`LineObserver`] in the order the game wrote them. One task multiplexes
//! that stream, the run deadline and the idle watchdog with `tokio::select!`.
//! On deadline the child is asked to stop (SIGTERM), given a grace window,
//! then killed.

use serde::{Deserialize, Serialize};
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::error::{ProbeError, ProbeResult};
use crate::invocation::Invocation;
use crate::obs;

/// Receives captured lines in arrival order.
pub trait LineObserver {
    /// Called once per line; `elapsed` is measured from spawn.
    fn observe(&mut self, line: &str, elapsed: Duration);
}

impl<F> LineObserver for F
where
    F: FnMut(&str, Duration),
{
    fn observe(&mut self, line: &str, elapsed: Duration) {
        self(line, elapsed)
    }
}

/// How the child came to stop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Exited on its own before the deadline.
    Exited,
    /// Already gone when the stop sequence began.
    ExitedBeforeStop,
    /// Exited within the grace window after the stop request.
    Terminated,
    /// Still alive after the grace window and force-killed.
    Killed,
}

/// Result of supervising one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessOutcome {
    /// Exit code; death by signal N is reported as `-N`.
    pub exit_code: i32,

    /// Wall-clock time from spawn until the child was reaped.
    pub elapsed: Duration,

    pub termination: Termination,

    /// Whether the run deadline expired while the child was supervised.
    pub deadline_reached: bool,

    /// Lines delivered to the observer.
    pub lines: usize,

    /// Read failure that ended streaming early, if any.
    pub read_error: Option<String>,

    /// Times the idle watchdog fired.
    pub idle_warnings: u32,
}

/// Process supervisor.
pub struct Supervisor;

type OutputReader = Box<dyn AsyncRead + Unpin + Send>;

enum StreamEvent {
    Deadline,
    Line(io::Result<Option<String>>),
    Idle,
}

#[derive(Debug, PartialEq, Eq)]
enum StopReason {
    Deadline,
    Eof,
    ReadError,
}

impl Supervisor {
    /// Launch the invocation and stream its output into `observer` until the
    /// child exits or the deadline expires.
    ///
    /// A missing executable is reported as [`ProbeError::ExecutableNotFound`]
    /// before any output is read.
    pub async fn run(
        invocation: &Invocation,
        observer: &mut dyn LineObserver,
    ) -> ProbeResult<ProcessOutcome> {
        let (mut child, mut streams) = spawn(invocation)?;
        let start = Instant::now();
        let deadline = start + invocation.duration;

        let streamed = pump(
            &mut streams,
            start,
            deadline,
            invocation.idle_warning,
            observer,
        )
        .await;

        let (status, termination, deadline_reached) = match streamed.reason {
            StopReason::Deadline => {
                obs::emit_deadline(invocation.duration);
                let (status, termination) = stop(&mut child, invocation.grace).await?;
                (status, termination, true)
            }
            StopReason::Eof => match tokio::time::timeout_at(deadline, child.wait()).await {
                Ok(status) => (status?, Termination::Exited, false),
                Err(_) => {
                    obs::emit_deadline(invocation.duration);
                    let (status, termination) = stop(&mut child, invocation.grace).await?;
                    (status, termination, true)
                }
            },
            StopReason::ReadError => {
                let (status, termination) = stop(&mut child, invocation.grace).await?;
                (status, termination, false)
            }
        };

        let exit_code = exit_code_of(status);
        debug!(exit_code, ?termination, lines = streamed.lines, "child reaped");

        Ok(ProcessOutcome {
            exit_code,
            elapsed: start.elapsed(),
            termination,
            deadline_reached,
            lines: streamed.lines,
            read_error: streamed.read_error,
            idle_warnings: streamed.idle_warnings,
        })
    }
}

/// What streaming saw before it ended.
struct Streamed {
    reason: StopReason,
    lines: usize,
    read_error: Option<String>,
    idle_warnings: u32,
}

/// Deliver lines from both streams until they close, a read fails or the
/// deadline passes. Partial trailing lines are flushed before returning.
async fn pump<R: AsyncRead + Unpin>(
    streams: &mut [LineStream<R>; 2],
    start: Instant,
    deadline: Instant,
    idle_warning: Option<Duration>,
    observer: &mut dyn LineObserver,
) -> Streamed {
    let [primary, secondary] = streams;
    let mut lines = 0usize;
    let mut read_error = None;
    let mut idle_warnings = 0u32;
    let mut last_activity = start;
    let mut idle_armed = idle_warning.is_some();
    let idle_window = idle_warning.unwrap_or(deadline - start);

    let reason = loop {
        if !primary.is_open() && !secondary.is_open() {
            break StopReason::Eof;
        }

        let event = tokio::select! {
            biased;
            _ = sleep_until(deadline) => StreamEvent::Deadline,
            res = primary.next_line(), if primary.is_open() => StreamEvent::Line(res),
            res = secondary.next_line(), if secondary.is_open() => StreamEvent::Line(res),
            _ = sleep_until(last_activity + idle_window), if idle_armed => StreamEvent::Idle,
        };

        match event {
            StreamEvent::Deadline => break StopReason::Deadline,
            StreamEvent::Line(Ok(Some(line))) => {
                lines += 1;
                last_activity = Instant::now();
                idle_armed = idle_warning.is_some();
                observer.observe(&line, start.elapsed());
            }
            StreamEvent::Line(Ok(None)) => {}
            StreamEvent::Line(Err(e)) => {
                warn!(error = %e, "read error while streaming output");
                read_error = Some(e.to_string());
                break StopReason::ReadError;
            }
            StreamEvent::Idle => {
                idle_warnings += 1;
                idle_armed = false;
                obs::emit_idle(last_activity.elapsed(), lines);
            }
        }
    };

    // A line still waiting for its newline was captured all the same.
    for stream in [primary, secondary] {
        if let Some(line) = stream.take_partial() {
            lines += 1;
            observer.observe(&line, start.elapsed());
        }
    }

    Streamed {
        reason,
        lines,
        read_error,
        idle_warnings,
    }
}

fn command(invocation: &Invocation) -> Command {
    let mut cmd = Command::new(invocation.executable());
    cmd.args(invocation.args())
        .stdin(Stdio::null())
        .kill_on_drop(true);
    cmd
}

fn spawn_error(invocation: &Invocation, source: io::Error) -> ProbeError {
    let path = invocation.executable().to_path_buf();
    match source.kind() {
        io::ErrorKind::NotFound => ProbeError::ExecutableNotFound { path },
        _ => ProbeError::Spawn { path, source },
    }
}

/// Spawn with stdout and stderr writing into one shared pipe.
///
/// The second stream is always closed. The parent's write ends are dropped
/// with the `Command`, so EOF arrives once every holder in the child's
/// process tree has closed them.
#[cfg(unix)]
fn spawn(invocation: &Invocation) -> ProbeResult<(Child, [LineStream<OutputReader>; 2])> {
    use tokio::net::unix::pipe;

    let (tx, rx) = pipe::pipe()?;
    let write = tx.into_blocking_fd()?;
    let child = command(invocation)
        .stdout(write.try_clone()?)
        .stderr(write)
        .spawn()
        .map_err(|source| spawn_error(invocation, source))?;

    let merged: OutputReader = Box::new(rx);
    Ok((child, [LineStream::new(Some(merged)), LineStream::new(None)]))
}

/// Spawn with one pipe per stream where a shared pipe is unavailable.
#[cfg(not(unix))]
fn spawn(invocation: &Invocation) -> ProbeResult<(Child, [LineStream<OutputReader>; 2])> {
    let mut child = command(invocation)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| spawn_error(invocation, source))?;

    let stdout = child.stdout.take().map(|r| Box::new(r) as OutputReader);
    let stderr = child.stderr.take().map(|r| Box::new(r) as OutputReader);
    Ok((child, [LineStream::new(stdout), LineStream::new(stderr)]))
}

/// Terminate, wait out the grace window, then kill.
///
/// A child that has already exited is reaped without being signalled.
async fn stop(child: &mut Child, grace: Duration) -> io::Result<(ExitStatus, Termination)> {
    if let Some(status) = child.try_wait()? {
        return Ok((status, Termination::ExitedBeforeStop));
    }

    if let Err(e) = request_stop(child) {
        warn!(error = %e, "stop request failed");
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => Ok((status?, Termination::Terminated)),
        Err(_) => {
            warn!(grace_ms = grace.as_millis() as u64, "child ignored stop request, killing");
            child.kill().await?;
            let status = child.wait().await?;
            Ok((status, Termination::Killed))
        }
    }
}

#[cfg(unix)]
fn request_stop(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(());
    };
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}

/// Map an exit status to the code the verdict is judged on.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

/// Cancel-safe line reader: partial reads stay in `buf` across `select!` turns.
struct LineStream<R> {
    reader: Option<BufReader<R>>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineStream<R> {
    fn new(inner: Option<R>) -> Self {
        Self {
            reader: inner.map(BufReader::new),
            buf: Vec::new(),
        }
    }

    fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    async fn next_line(&mut self) -> io::Result<Option<String>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        let n = reader.read_until(b'\n', &mut self.buf).await?;
        if n == 0 {
            self.reader = None;
            if self.buf.is_empty() {
                return Ok(None);
            }
        }

        let line = decode_line(&self.buf);
        self.buf.clear();
        Ok(Some(line))
    }

    /// Bytes read past the last newline, if any, as a final line.
    fn take_partial(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = decode_line(&self.buf);
        self.buf.clear();
        Some(line)
    }
}

fn decode_line(raw: &[u8]) -> String {
    let trimmed = raw
        .strip_suffix(b"\n")
        .map(|r| r.strip_suffix(b"\r").unwrap_or(r))
        .unwrap_or(raw);
    String::from_utf8_lossy(trimmed).into_owned()
}
