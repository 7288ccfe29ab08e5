//! Run an external command with a wall-clock timeout and captured output.
//!
//! This is the one process primitive of the crate: code execution, package
//! installation, the package listing and the telemetry probes all go through
//! [`run`]. The child runs with the full privileges, environment and network
//! access of the hosting process. Nothing here restricts it beyond the
//! timeout.

use crate::error::{DashboardError, Result};
use serde::Serialize;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long readers may keep draining pipes after a timeout kill.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Configuration for running a command.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub command: Vec<String>,
    pub timeout: Duration,
    /// Per-stream character budget.
    pub output_limit: usize,
}

/// Result of running a command.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub duration_ms: u64,
}

impl RunResult {
    /// Exit code zero within the time budget.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

#[derive(Debug, Default)]
struct Capture {
    bytes: Vec<u8>,
    dropped: bool,
}

type SharedCapture = Arc<Mutex<Capture>>;

/// Run `config.command` and wait for it, at most `config.timeout`.
///
/// A non-zero exit is reported in the result, not as an error. On timeout
/// the whole process group is killed and the result carries whatever the
/// child flushed before it died.
pub async fn run(config: &RunConfig) -> Result<RunResult> {
    let (program, args) = config
        .command
        .split_first()
        .ok_or(DashboardError::EmptyCommand)?;
    info!(command = ?config.command, timeout_secs = config.timeout.as_secs(), "Running command");

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group so a timeout kill also reaches grandchildren
    #[cfg(unix)]
    cmd.process_group(0);

    let started = Instant::now();
    let mut child = cmd.spawn().map_err(|source| DashboardError::Spawn {
        program: program.clone(),
        source,
    })?;
    let pid = child.id();
    debug!(pid = ?pid, "Child spawned");

    // Keep up to 4 bytes per char so lossy decoding still fills the budget
    let byte_budget = config.output_limit.saturating_mul(4);
    let stdout_buf = SharedCapture::default();
    let stderr_buf = SharedCapture::default();
    let mut stdout_task = child
        .stdout
        .take()
        .map(|out| tokio::spawn(drain(out, stdout_buf.clone(), byte_budget)));
    let mut stderr_task = child
        .stderr
        .take()
        .map(|err| tokio::spawn(drain(err, stderr_buf.clone(), byte_budget)));

    let finished = tokio::time::timeout(config.timeout, async {
        let status = child.wait().await;
        join_reader(&mut stdout_task).await;
        join_reader(&mut stderr_task).await;
        status
    })
    .await;

    let (status, timed_out) = match finished {
        Ok(status) => {
            let status = status.map_err(|source| DashboardError::Spawn {
                program: program.clone(),
                source,
            })?;
            (Some(status), false)
        }
        Err(_) => {
            warn!(command = ?config.command, timeout_secs = config.timeout.as_secs(), "Command timed out, killing");
            kill_process_group(&mut child, pid);
            let status = child.wait().await.ok();
            let _ = tokio::time::timeout(DRAIN_GRACE, async {
                join_reader(&mut stdout_task).await;
                join_reader(&mut stderr_task).await;
            })
            .await;
            (status, true)
        }
    };
    for task in [stdout_task, stderr_task].into_iter().flatten() {
        task.abort();
    }

    let (stdout, stdout_truncated) = decode(&stdout_buf, config.output_limit);
    let (stderr, stderr_truncated) = decode(&stderr_buf, config.output_limit);
    let (exit_code, signal) = status.map(exit_parts).unwrap_or((None, None));
    let duration_ms = started.elapsed().as_millis() as u64;
    info!(exit_code = ?exit_code, signal = ?signal, timed_out, duration_ms,
          stdout_len = stdout.len(), stderr_len = stderr.len(), "Command finished");

    Ok(RunResult {
        stdout,
        stderr,
        exit_code,
        signal,
        timed_out,
        stdout_truncated,
        stderr_truncated,
        duration_ms,
    })
}

/// Like [`run`], but a timeout is an error. For commands whose output is
/// parsed rather than shown.
pub async fn run_to_completion(config: &RunConfig) -> Result<RunResult> {
    let result = run(config).await?;
    if result.timed_out {
        return Err(DashboardError::Timeout {
            program: config.command.first().cloned().unwrap_or_default(),
            secs: config.timeout.as_secs(),
        });
    }
    Ok(result)
}

/// Cut `text` to at most `limit` chars. Returns whether anything was cut.
pub fn truncate_chars(text: &str, limit: usize) -> (String, bool) {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => (text[..idx].to_string(), true),
        None => (text.to_string(), false),
    }
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R, sink: SharedCapture, byte_budget: usize) {
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut capture = sink.lock().unwrap_or_else(PoisonError::into_inner);
                let room = byte_budget.saturating_sub(capture.bytes.len());
                if n > room {
                    capture.dropped = true;
                }
                // Past the budget we keep reading so the child never blocks on a full pipe
                capture.bytes.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
}

async fn join_reader(task: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = task.as_mut() {
        let _ = handle.await;
        *task = None;
    }
}

fn decode(buf: &SharedCapture, limit: usize) -> (String, bool) {
    let capture = buf.lock().unwrap_or_else(PoisonError::into_inner);
    let text = String::from_utf8_lossy(&capture.bytes);
    let (text, cut) = truncate_chars(&text, limit);
    (text, cut || capture.dropped)
}

fn exit_parts(status: ExitStatus) -> (Option<i32>, Option<i32>) {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        (status.code(), status.signal())
    }
    #[cfg(not(unix))]
    {
        (status.code(), None)
    }
}

#[cfg(target_os = "linux")]
fn kill_process_group(child: &mut Child, pid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!(pid, error = %e, "SIGKILL to process group failed"),
        }
    }
    let _ = child.start_kill();
}

#[cfg(not(target_os = "linux"))]
fn kill_process_group(child: &mut Child, _pid: Option<u32>) {
    let _ = child.start_kill();
}
