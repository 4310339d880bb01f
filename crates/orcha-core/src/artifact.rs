//! Per-agent log artifacts written under `<project>/logs/`.
//!
//! One file per invoked agent per run, named
//! `<agent>_<YYYYmmdd-HHMMSS>[_timeout].log`. Files are created with
//! `create_new` and never rewritten; a name clash gets a `-N` suffix.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;

use crate::error::{OrchaError, Result};
use crate::executor::ExecutionReport;
use crate::run::{AgentId, FILE_TIMESTAMP_FORMAT};

pub const LOGS_DIR: &str = "logs";

const MAX_NAME_ATTEMPTS: u32 = 100;

/// How the invocation ended, as recorded in the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogStatus {
    Exited { exit_code: Option<i32> },
    TimedOut { limit: Duration, exit_code: Option<i32> },
    Error { message: String },
}

/// Contents of one agent log file.
#[derive(Debug, Clone)]
pub struct AgentLog {
    pub agent: AgentId,
    pub task: String,
    pub command: Option<String>,
    pub status: LogStatus,
    pub stdout: String,
    pub stderr: String,
}

impl AgentLog {
    pub fn from_report(report: &ExecutionReport, task: &str) -> Self {
        let status = if report.timed_out {
            LogStatus::TimedOut {
                limit: report.timeout.unwrap_or_default(),
                exit_code: report.exit_code,
            }
        } else {
            LogStatus::Exited {
                exit_code: report.exit_code,
            }
        };
        Self {
            agent: report.agent.clone(),
            task: task.to_string(),
            command: report.command.clone(),
            status,
            stdout: report.stdout.clone(),
            stderr: report.stderr.clone(),
        }
    }

    pub fn from_error(
        agent: &AgentId,
        task: &str,
        command: Option<String>,
        error: &OrchaError,
    ) -> Self {
        Self {
            agent: agent.clone(),
            task: task.to_string(),
            command,
            status: LogStatus::Error {
                message: error.to_string(),
            },
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.status, LogStatus::TimedOut { .. })
    }

    /// Base file name (without collision suffix) for a log written at `at`.
    pub fn file_name(&self, at: DateTime<Utc>) -> String {
        format!(
            "{}_{}{}.log",
            sanitize(self.agent.as_str()),
            at.format(FILE_TIMESTAMP_FORMAT),
            if self.timed_out() { "_timeout" } else { "" }
        )
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let stream_suffix = match &self.status {
            LogStatus::TimedOut { .. } => {
                let _ = writeln!(out, "--- Agent: {} (TIMED OUT) ---", self.agent);
                " (before timeout)"
            }
            LogStatus::Error { .. } => {
                let _ = writeln!(out, "--- Agent: {} (ERROR) ---", self.agent);
                ""
            }
            LogStatus::Exited { .. } => {
                let _ = writeln!(out, "--- Agent: {} ---", self.agent);
                ""
            }
        };
        let _ = writeln!(out, "--- Task: {} ---", self.task);
        let _ = writeln!(
            out,
            "--- Command: {} ---",
            self.command.as_deref().unwrap_or("(simulated)")
        );

        match &self.status {
            LogStatus::Exited { exit_code } => {
                let _ = writeln!(out, "--- Exit Code: {} ---", render_code(*exit_code));
            }
            LogStatus::TimedOut { limit, exit_code } => {
                let _ = writeln!(out, "--- Timeout: {} seconds ---", limit.as_secs());
                let _ = writeln!(
                    out,
                    "--- Exit Code: {} (killed after timeout) ---",
                    render_code(*exit_code)
                );
            }
            LogStatus::Error { message } => {
                let _ = writeln!(out, "--- Error: {message} ---");
            }
        }

        let _ = writeln!(out, "--- STDOUT{stream_suffix} ---\n{}", self.stdout);
        let _ = writeln!(out, "--- STDERR{stream_suffix} ---\n{}", self.stderr);
        out
    }

    /// Write the artifact into `logs_dir` and return its path.
    pub async fn write(&self, logs_dir: &Path, at: DateTime<Utc>) -> Result<PathBuf> {
        tokio::fs::create_dir_all(logs_dir)
            .await
            .map_err(|e| OrchaError::persistence(logs_dir, e))?;

        let base = self.file_name(at);
        let body = self.render();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = logs_dir.join(with_suffix(&base, attempt));
            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match file {
                Ok(mut file) => {
                    file.write_all(body.as_bytes())
                        .await
                        .map_err(|e| OrchaError::persistence(&path, e))?;
                    file.flush()
                        .await
                        .map_err(|e| OrchaError::persistence(&path, e))?;
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(OrchaError::persistence(&path, e)),
            }
        }

        Err(OrchaError::persistence(
            logs_dir.join(&base),
            std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "no free log file name",
            ),
        ))
    }
}

fn render_code(code: Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "none (terminated by signal)".to_string())
}

/// Keep agent names usable as file name components.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `name.log` → `name-N.log` for N > 0.
pub(crate) fn with_suffix(file_name: &str, attempt: u32) -> String {
    if attempt == 0 {
        return file_name.to_string();
    }
    match file_name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}-{attempt}.{ext}"),
        None => format!("{file_name}-{attempt}"),
    }
}
