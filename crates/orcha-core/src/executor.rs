//! Bounded execution of a single agent invocation.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::agent::{ProcessInvocation, SimulatedInvocation, WorkSpec};
use crate::config::{OrchestratorConfig, DEFAULT_DRAIN_GRACE_MS};
use crate::error::{OrchaError, Result};
use crate::run::{AgentId, AgentOutcome};

/// Result of one agent execution.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub agent: AgentId,

    /// Display form of the command (process agents only).
    pub command: Option<String>,

    /// Exit code; `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,

    pub stdout: String,

    pub stderr: String,

    pub timed_out: bool,

    /// Limit that applied, if any. Simulated agents run unbounded.
    pub timeout: Option<Duration>,

    pub duration_ms: u64,
}

impl ExecutionReport {
    /// Whether the agent finished on its own with exit code 0.
    pub fn passed(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn outcome(&self) -> AgentOutcome {
        if self.timed_out {
            AgentOutcome::TimedOut
        } else if self.exit_code == Some(0) {
            AgentOutcome::Success
        } else {
            AgentOutcome::Failed
        }
    }
}

/// Runs work specs under a deadline.
#[derive(Debug, Clone)]
pub struct BoundedExecutor {
    drain_grace: Duration,
}

impl Default for BoundedExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_DRAIN_GRACE_MS))
    }
}

impl BoundedExecutor {
    /// `drain_grace` bounds how long pipes are drained once the process is
    /// gone; a grandchild holding a pipe open cannot stall the run.
    pub fn new(drain_grace: Duration) -> Self {
        Self { drain_grace }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.drain_grace())
    }

    /// Execute `spec`. Process agents are killed once `timeout` elapses;
    /// simulated agents run to completion.
    ///
    /// Returns `Err(Invocation)` when the work could not be started or
    /// raised an error while running.
    pub async fn execute(&self, spec: &WorkSpec, timeout: Duration) -> Result<ExecutionReport> {
        match spec {
            WorkSpec::Process(invocation) => self.execute_process(invocation, timeout).await,
            WorkSpec::Simulated(invocation) => self.execute_simulated(invocation).await,
        }
    }

    async fn execute_process(
        &self,
        invocation: &ProcessInvocation,
        timeout: Duration,
    ) -> Result<ExecutionReport> {
        let start = Instant::now();
        let command = invocation.display_command();
        let invocation_error = |reason: String| OrchaError::Invocation {
            agent: invocation.agent.to_string(),
            reason,
        };

        info!(agent = %invocation.agent, command = %command, "executing agent command");

        let mut command_builder = Command::new(&invocation.program);
        command_builder
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // The agent leads its own process group so a timeout can stop
        // everything it started, not just the direct child.
        #[cfg(unix)]
        command_builder.process_group(0);

        let mut child = command_builder
            .spawn()
            .map_err(|e| invocation_error(format!("failed to spawn {}: {e}", invocation.program)))?;

        let stdout = child.stdout.take().map(Capture::spawn);
        let stderr = child.stderr.take().map(Capture::spawn);

        let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => {
                let status = status.map_err(|e| invocation_error(format!("wait failed: {e}")))?;
                (status.code(), false)
            }
            Err(_) => {
                warn!(
                    agent = %invocation.agent,
                    timeout_secs = timeout.as_secs(),
                    "agent timed out, terminating process"
                );
                if let Err(e) = kill_process_tree(&mut child).await {
                    warn!(agent = %invocation.agent, error = %e, "failed to kill timed out process");
                }
                let code = child.try_wait().ok().flatten().and_then(|s| s.code());
                (code, true)
            }
        };

        let stdout = match stdout {
            Some(c) => c.finish(self.drain_grace).await,
            None => String::new(),
        };
        let stderr = match stderr {
            Some(c) => c.finish(self.drain_grace).await,
            None => String::new(),
        };

        let report = ExecutionReport {
            agent: invocation.agent.clone(),
            command: Some(command),
            exit_code,
            stdout,
            stderr,
            timed_out,
            timeout: Some(timeout),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        debug!(
            agent = %report.agent,
            exit_code = ?report.exit_code,
            timed_out = report.timed_out,
            duration_ms = report.duration_ms,
            "agent process finished"
        );

        Ok(report)
    }

    async fn execute_simulated(&self, invocation: &SimulatedInvocation) -> Result<ExecutionReport> {
        let start = Instant::now();
        let output = invocation
            .behavior
            .invoke(&invocation.task, &invocation.project)
            .await
            .map_err(|e| OrchaError::Invocation {
                agent: invocation.agent.to_string(),
                reason: e.to_string(),
            })?;

        Ok(ExecutionReport {
            agent: invocation.agent.clone(),
            command: None,
            exit_code: Some(if output.success { 0 } else { 1 }),
            stdout: output.message,
            stderr: String::new(),
            timed_out: false,
            timeout: None,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// SIGKILL the child's process group, then kill and reap the child itself.
async fn kill_process_tree(child: &mut Child) -> std::io::Result<()> {
    if let Some(pid) = child.id() {
        kill_process_group(pid);
    }
    child.kill().await
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    // SAFETY: kill(2) takes plain integers; a negated pid signals the group
    // the child leads.
    let ret = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            debug!(pid, error = %err, "process group kill failed");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

/// Incrementally drains one pipe so partial output survives a kill.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    handle: JoinHandle<()>,
}

impl Capture {
    fn spawn<R>(mut reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let handle = tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
                    Err(e) => {
                        debug!(error = %e, "pipe read failed");
                        break;
                    }
                }
            }
        });
        Self { buf, handle }
    }

    async fn finish(mut self, grace: Duration) -> String {
        if tokio::time::timeout(grace, &mut self.handle).await.is_err() {
            debug!("pipe still open after grace period, keeping partial output");
            self.handle.abort();
        }
        let bytes = self.buf.lock().await;
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
