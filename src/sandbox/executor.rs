//! Sandboxed program execution.
//!
//! Runs one program per call in a separate process and classifies the
//! result as pass, timeout or failure. A single execution is authoritative:
//! nothing here retries.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use super::config::{Isolation, SandboxConfig};
use super::driver::RESULT_FILE;
use super::limits::{apply_unix_limits, kill_process_group};
use super::outcome::SandboxOutcome;
use crate::metrics::MetricsCollector;

/// Directory inside the scratch root holding the driver and the program.
pub(super) const WORK_DIR: &str = "work";

/// Maximum length of a failure reason kept in a [`SandboxOutcome::Fail`].
const MAX_REASON_LEN: usize = 200;

/// How long to wait for the stderr reader after the child is gone.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Errors that prevent a sandboxed execution from being observed.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Failed to create the scratch directory or write the program.
    #[error("Failed to prepare scratch directory: {0}")]
    Setup(#[source] std::io::Error),

    /// The interpreter could not be started.
    #[error("Failed to spawn '{interpreter}': {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },

    /// The child could not enter its namespaces, or the interpreter is
    /// missing from the isolated root.
    #[error("Failed to start '{interpreter}' in an isolated root: {source}")]
    Isolation {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the child failed.
    #[error("Failed to wait for sandboxed process: {0}")]
    Wait(#[source] std::io::Error),

    /// An empty program did not pass.
    #[error("Sandbox self-check did not pass: {0}")]
    SelfCheck(SandboxOutcome),
}

/// Runs untrusted programs under a deadline and resource limits.
#[derive(Debug, Clone, Default)]
pub struct SandboxExecutor {
    config: SandboxConfig,
    metrics: MetricsCollector,
}

impl SandboxExecutor {
    /// Creates a new executor.
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            metrics: MetricsCollector::new(),
        }
    }

    /// Returns the executor configuration.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Runs an empty program end to end.
    ///
    /// Fails when the interpreter cannot start or, with namespace isolation,
    /// when the kernel refuses the namespaces.
    pub async fn preflight(&self) -> Result<(), SandboxError> {
        match self.try_execute("", self.config.timeout).await? {
            SandboxOutcome::Pass => Ok(()),
            other => Err(SandboxError::SelfCheck(other)),
        }
    }

    /// Executes `program` with the configured default timeout.
    pub async fn execute_default(&self, program: &str) -> SandboxOutcome {
        self.execute(program, self.config.timeout).await
    }

    /// Executes `program` and classifies the outcome.
    ///
    /// The child is force-killed once `timeout` plus the configured grace
    /// window has elapsed. A program that finishes after `timeout` is still
    /// a timeout, and so is one that exits without its driver recording
    /// completion. Infrastructure errors are reported as failures.
    pub async fn execute(&self, program: &str, timeout: Duration) -> SandboxOutcome {
        let outcome = match self.try_execute(program, timeout).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Sandbox execution could not be observed");
                SandboxOutcome::Fail(truncate_reason(&e.to_string()))
            }
        };
        self.metrics.record_sandbox_outcome(outcome.tag());
        outcome
    }

    async fn try_execute(
        &self,
        program: &str,
        timeout: Duration,
    ) -> Result<SandboxOutcome, SandboxError> {
        let scratch = tempfile::Builder::new()
            .prefix("bench-sandbox-")
            .tempdir()
            .map_err(SandboxError::Setup)?;
        let work = scratch.path().join(WORK_DIR);
        let driver = self.config.driver;
        tokio::fs::create_dir_all(&work)
            .await
            .map_err(SandboxError::Setup)?;
        tokio::fs::write(work.join(driver.entry_file()), driver.script())
            .await
            .map_err(SandboxError::Setup)?;
        tokio::fs::write(work.join(driver.solution_file()), program)
            .await
            .map_err(SandboxError::Setup)?;

        let token = Uuid::new_v4().simple().to_string();
        let window = timeout + self.config.grace;
        let home = match self.config.isolation {
            Isolation::Namespaces => Path::new("/").join(WORK_DIR),
            Isolation::Off => work.clone(),
        };

        let mut cmd = Command::new(&self.config.interpreter);
        cmd.args(&self.config.interpreter_args)
            .arg(driver.entry_file())
            .current_dir(&work)
            .env_clear()
            .env("PATH", &self.config.path_env)
            .env("HOME", &home)
            .env("TMPDIR", &home)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        self.confine(&mut cmd, scratch.path())?;
        apply_unix_limits(
            &mut cmd,
            &self.config.limits,
            self.config.limits.effective_cpu_seconds(window),
        );

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| {
            let interpreter = self.config.interpreter.clone();
            match self.config.isolation {
                Isolation::Namespaces => SandboxError::Isolation { interpreter, source },
                Isolation::Off => SandboxError::Spawn { interpreter, source },
            }
        })?;
        let pid = child.id();

        if let Some(mut stdin) = child.stdin.take() {
            // The driver may die before reading; a closed pipe is not an error here.
            let _ = stdin.write_all(format!("{}\n", token).as_bytes()).await;
        }

        let max_stderr = self.config.max_stderr_bytes;
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(read_output_limited(stderr, max_stderr)));

        let waited = tokio::time::timeout(window, child.wait()).await;
        let elapsed = start.elapsed();

        // Take down anything the program left behind in its group.
        if let Some(pid) = pid {
            kill_process_group(pid);
        }

        let status = match waited {
            Ok(status) => status.map_err(SandboxError::Wait)?,
            Err(_) => {
                let _ = child.kill().await;
                debug!(?elapsed, "Sandboxed process killed at deadline");
                return Ok(SandboxOutcome::Timeout);
            }
        };

        let stderr = match stderr_task {
            Some(task) => match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, task).await {
                Ok(Ok(text)) => text,
                _ => String::new(),
            },
            None => String::new(),
        };

        let completed = read_record(&work)
            .await
            .is_some_and(|record| record.trim() == token);
        let outcome = classify(status, elapsed, timeout, completed, &stderr);
        debug!(?elapsed, completed, outcome = %outcome, "Sandboxed process finished");
        Ok(outcome)
    }

    fn confine(&self, cmd: &mut Command, root: &Path) -> Result<(), SandboxError> {
        match self.config.isolation {
            Isolation::Off => Ok(()),
            #[cfg(unix)]
            Isolation::Namespaces => {
                let plan = super::isolation::prepare_root(root, &self.config.read_only_paths)
                    .map_err(SandboxError::Setup)?;
                super::isolation::apply_isolation(cmd, plan);
                Ok(())
            }
            #[cfg(not(unix))]
            Isolation::Namespaces => {
                let _ = (cmd, root);
                Err(SandboxError::Isolation {
                    interpreter: self.config.interpreter.clone(),
                    source: std::io::Error::from(std::io::ErrorKind::Unsupported),
                })
            }
        }
    }
}

async fn read_record(work: &Path) -> Option<String> {
    let path: PathBuf = work.join(RESULT_FILE);
    tokio::fs::read_to_string(path).await.ok()
}

/// Maps an exit status and the completion record to an outcome.
fn classify(
    status: ExitStatus,
    elapsed: Duration,
    timeout: Duration,
    completed: bool,
    stderr: &str,
) -> SandboxOutcome {
    if elapsed > timeout {
        return SandboxOutcome::Timeout;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return match signal {
                libc::SIGXCPU | libc::SIGKILL => SandboxOutcome::Timeout,
                other => SandboxOutcome::Fail(format!("terminated by signal {}", other)),
            };
        }
    }

    if status.success() {
        // A clean exit without a record means the program left early.
        return if completed {
            SandboxOutcome::Pass
        } else {
            SandboxOutcome::Timeout
        };
    }

    let reason = failure_reason(stderr).unwrap_or_else(|| match status.code() {
        Some(code) => format!("exit status {}", code),
        None => "abnormal termination".to_string(),
    });
    SandboxOutcome::Fail(reason)
}

fn exception_line() -> Option<&'static Regex> {
    static EXCEPTION_LINE: OnceLock<Option<Regex>> = OnceLock::new();
    EXCEPTION_LINE
        .get_or_init(|| Regex::new(r"^[A-Za-z_][\w.]*(Error|Exception|Exit|Interrupt)\b.*$").ok())
        .as_ref()
}

/// Picks a short diagnostic from captured stderr.
///
/// Prefers the last exception line of a traceback, then the last non-empty line.
fn failure_reason(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let exception = exception_line().and_then(|re| lines.iter().rev().find(|l| re.is_match(l)));
    exception
        .or_else(|| lines.last())
        .map(|line| truncate_reason(line))
}

fn truncate_reason(reason: &str) -> String {
    if reason.chars().count() <= MAX_REASON_LEN {
        reason.to_string()
    } else {
        let cut: String = reason.chars().take(MAX_REASON_LEN).collect();
        format!("{}...", cut)
    }
}

/// Reads a stream to the end, keeping at most `max_bytes`.
///
/// Keeps draining after the limit so the child never blocks on a full pipe.
async fn read_output_limited<R: AsyncRead + Unpin>(mut reader: R, max_bytes: usize) -> String {
    let mut kept = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = max_bytes.saturating_sub(kept.len());
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
    String::from_utf8_lossy(&kept).into_owned()
}
