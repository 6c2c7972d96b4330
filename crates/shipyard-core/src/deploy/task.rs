//! Typed deployment tasks.
//!
//! A deployment runs an ordered pipeline of [`DeployTask`]s. Each reports a
//! [`TaskOutcome`] so failures are classified (nonzero exit, timeout) rather
//! than left as free-form script output.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use crate::error::ShipyardResult;
use crate::fs::{copy_atomic, resolve_under};
use crate::package::Package;
use crate::types::DeploymentId;

/// Everything a task may look at. Environment variables the deployed
/// artifact needs are inherited as-is and never read here.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub deployment: DeploymentId,
    pub package: Package,
    /// Scoped working directory holding the extracted archive
    pub work_dir: PathBuf,
    pub target_root: PathBuf,
    pub timeout: Duration,
    pub max_log_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl TaskOutcome {
    pub fn succeeded(stdout: String, duration: Duration) -> Self {
        Self {
            success: true,
            exit_code: None,
            timed_out: false,
            stdout,
            stderr: String::new(),
            duration,
        }
    }

    /// One-line summary used as the record's failure message.
    pub fn describe_failure(&self, task: &str) -> String {
        if self.timed_out {
            return format!("{} timed out after {:?}", task, self.duration);
        }
        let code = match self.exit_code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        let last_line = self
            .stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map(|l| format!(": {}", l.trim()))
            .unwrap_or_default();
        format!("{} failed with {}{}", task, code, last_line)
    }
}

pub type TaskFuture<'a> = Pin<Box<dyn Future<Output = ShipyardResult<TaskOutcome>> + Send + 'a>>;

/// One step of a deployment pipeline.
///
/// `Err` means the task could not run at all; a task that ran and failed
/// returns `Ok` with `success == false`.
pub trait DeployTask: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the task writes to the target root. Cancellation is honored
    /// only before the first mutating task starts.
    fn mutates_target(&self) -> bool {
        true
    }

    fn run<'a>(&'a self, ctx: &'a TaskContext) -> TaskFuture<'a>;
}

/// Copy payload files from the working directory onto the target root.
#[derive(Debug, Default)]
pub struct PayloadTask;

impl DeployTask for PayloadTask {
    fn name(&self) -> &str {
        "payload"
    }

    fn run<'a>(&'a self, ctx: &'a TaskContext) -> TaskFuture<'a> {
        Box::pin(async move {
            let started = Instant::now();
            let mut copied = Vec::new();
            for path in ctx.package.payload() {
                let src = ctx.work_dir.join(path);
                let dst = resolve_under(&ctx.target_root, Path::new(path))?;
                copy_atomic(&src, &dst)?;
                tracing::debug!(path, "copied payload file");
                copied.push(path.to_string());
            }
            let mut stdout = format!("copied {} file(s)\n", copied.len());
            for path in &copied {
                stdout.push_str(path);
                stdout.push('\n');
            }
            Ok(TaskOutcome::succeeded(
                truncate_log(stdout.as_bytes(), ctx.max_log_bytes),
                started.elapsed(),
            ))
        })
    }
}

/// How long output readers may keep going once the script has exited or
/// been killed. Background jobs that inherited the pipes can hold them open
/// indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Run the package's embedded script with `sh` inside the working directory.
///
/// Only the script's own exit is bounded by the timeout. On timeout the
/// script's whole process group is killed so nothing it started keeps
/// writing to the target.
#[derive(Debug, Default)]
pub struct ScriptTask;

impl DeployTask for ScriptTask {
    fn name(&self) -> &str {
        "script"
    }

    fn run<'a>(&'a self, ctx: &'a TaskContext) -> TaskFuture<'a> {
        Box::pin(async move {
            let started = Instant::now();
            let mut command = tokio::process::Command::new("sh");
            command
                .arg(&ctx.package.script)
                .current_dir(&ctx.work_dir)
                .env("SHIPYARD_TARGET_ROOT", &ctx.target_root)
                .env("SHIPYARD_PACKAGE", &ctx.package.name)
                .env("SHIPYARD_VERSION", ctx.package.version.to_string())
                .env("SHIPYARD_DEPLOYMENT_ID", ctx.deployment.as_str())
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            #[cfg(unix)]
            command.process_group(0);

            let mut child = command.spawn().with_context(|| {
                format!(
                    "Failed to start deploy script {} in {}",
                    ctx.package.script,
                    ctx.work_dir.display()
                )
            })?;
            let pid = child.id();
            tracing::info!(
                deployment = %ctx.deployment,
                script = %ctx.package.script,
                pid,
                "running deploy script"
            );

            let mut stdout = LogDrain::spawn(child.stdout.take(), ctx.max_log_bytes);
            let mut stderr = LogDrain::spawn(child.stderr.take(), ctx.max_log_bytes);

            let status = match tokio::time::timeout(ctx.timeout, child.wait()).await {
                Ok(status) => Some(status.context("Failed to wait for deploy script")?),
                Err(_) => {
                    tracing::warn!(
                        deployment = %ctx.deployment,
                        timeout = ?ctx.timeout,
                        pid,
                        "deploy script timed out, killing its process group"
                    );
                    kill_process_group(pid);
                    child.kill().await.ok();
                    None
                }
            };

            tokio::join!(stdout.settle(), stderr.settle());
            if status.is_some() && (!stdout.finished || !stderr.finished) {
                tracing::debug!(
                    deployment = %ctx.deployment,
                    "script exited with its output still held open by a background job"
                );
            }

            Ok(TaskOutcome {
                success: status.is_some_and(|s| s.success()),
                exit_code: status.and_then(|s| s.code()),
                timed_out: status.is_none(),
                stdout: stdout.capture.render(),
                stderr: stderr.capture.render(),
                duration: started.elapsed(),
            })
        })
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    if let Err(err) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        tracing::debug!(pid, error = %err, "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Bytes kept from one output stream plus a count of what was dropped.
#[derive(Debug, Default)]
struct LogCapture {
    kept: Vec<u8>,
    dropped: usize,
}

impl LogCapture {
    fn push(&mut self, chunk: &[u8], max: usize) {
        let room = max.saturating_sub(self.kept.len());
        let take = room.min(chunk.len());
        self.kept.extend_from_slice(&chunk[..take]);
        self.dropped += chunk.len() - take;
    }

    fn render(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.kept).into_owned();
        if self.dropped > 0 {
            text.push_str(&format!("\n[truncated {} bytes]", self.dropped));
        }
        text
    }
}

/// Reads a child pipe to EOF on its own task, keeping at most `max` bytes.
///
/// Reading never stops at the cap, so the child cannot block on a full pipe.
struct LogDrain {
    shared: Arc<Mutex<LogCapture>>,
    handle: Option<JoinHandle<()>>,
    capture: LogCapture,
    finished: bool,
}

impl LogDrain {
    fn spawn<R>(reader: Option<R>, max: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let shared = Arc::new(Mutex::new(LogCapture::default()));
        let handle = reader.map(|mut reader| {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                let mut buf = [0u8; 8192];
                loop {
                    match reader.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            lock(&shared).push(&buf[..n], max);
                        }
                    }
                }
            })
        });
        Self {
            shared,
            handle,
            capture: LogCapture::default(),
            finished: false,
        }
    }

    /// Give the reader [`DRAIN_GRACE`] to hit EOF, then stop it and keep
    /// whatever it collected.
    async fn settle(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            match tokio::time::timeout(DRAIN_GRACE, &mut handle).await {
                Ok(_) => self.finished = true,
                Err(_) => handle.abort(),
            }
        } else {
            self.finished = true;
        }
        self.capture = std::mem::take(&mut *lock(&self.shared));
    }
}

fn lock(capture: &Mutex<LogCapture>) -> std::sync::MutexGuard<'_, LogCapture> {
    capture.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Lossy UTF-8 view of at most `max` bytes.
pub fn truncate_log(bytes: &[u8], max: usize) -> String {
    let mut capture = LogCapture::default();
    capture.push(bytes, max);
    capture.render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_log_marks_dropped_bytes() {
        assert_eq!(truncate_log(b"short", 10), "short");
        let text = truncate_log(b"0123456789", 4);
        assert!(text.starts_with("0123"));
        assert!(text.ends_with("[truncated 6 bytes]"));
    }

    #[test]
    fn capture_counts_bytes_past_the_cap_across_chunks() {
        let mut capture = LogCapture::default();
        capture.push(b"abc", 5);
        capture.push(b"defgh", 5);
        capture.push(b"ij", 5);
        assert_eq!(capture.kept, b"abcde");
        assert_eq!(capture.dropped, 5);
        assert_eq!(capture.render(), "abcde\n[truncated 5 bytes]");
    }

    #[test]
    fn describe_failure_uses_last_stderr_line() {
        let outcome = TaskOutcome {
            success: false,
            exit_code: Some(1),
            timed_out: false,
            stdout: String::new(),
            stderr: "copying files\ncp: cannot stat 'dist'\n\n".into(),
            duration: Duration::from_millis(12),
        };
        assert_eq!(
            outcome.describe_failure("script"),
            "script failed with exit code 1: cp: cannot stat 'dist'"
        );
    }

    #[test]
    fn describe_failure_reports_timeouts() {
        let outcome = TaskOutcome {
            success: false,
            exit_code: None,
            timed_out: true,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::from_secs(2),
        };
        assert!(outcome.describe_failure("script").contains("timed out"));
    }
}
