//! Durable orchestration history.
//!
//! Each run becomes one pretty-printed JSON document named
//! `orchestration_record_<YYYYmmdd-HHMMSS>[_critical_failure].json`. Records
//! are write-once; listing always re-reads the directory.

use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

use crate::artifact::with_suffix;
use crate::error::{OrchaError, Result};
use crate::run::{OrchestrationRun, FILE_TIMESTAMP_FORMAT};

pub const RECORD_PREFIX: &str = "orchestration_record_";
pub const RECORD_EXTENSION: &str = ".json";
pub const CRITICAL_SUFFIX: &str = "_critical_failure";

const MAX_NAME_ATTEMPTS: u32 = 100;

/// Filesystem-backed store of orchestration records.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    /// The directory is created lazily on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Base file name for `run`, derived from its end (or start) time.
    pub fn record_file_name(run: &OrchestrationRun) -> String {
        let stamp = run.ended_at.unwrap_or(run.started_at);
        format!(
            "{RECORD_PREFIX}{}{}{RECORD_EXTENSION}",
            stamp.format(FILE_TIMESTAMP_FORMAT),
            if run.is_critical() { CRITICAL_SUFFIX } else { "" }
        )
    }

    /// Persist `run` and return the record path.
    ///
    /// The document is written to a temp file in the history directory and
    /// renamed without clobbering, so an existing record is never replaced.
    pub async fn save(&self, run: &OrchestrationRun) -> Result<PathBuf> {
        let body = serde_json::to_vec_pretty(run)?;
        let dir = self.dir.clone();
        let base = Self::record_file_name(run);

        tokio::task::spawn_blocking(move || write_record(&dir, &base, &body))
            .await
            .map_err(|e| OrchaError::Io(std::io::Error::other(e)))?
    }

    /// All readable records, newest first.
    ///
    /// A missing directory yields an empty list. Unparsable files are logged
    /// and skipped.
    pub async fn list_all(&self) -> Vec<OrchestrationRun> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "history directory does not exist");
                return Vec::new();
            }
            Err(e) => {
                error!(dir = %self.dir.display(), error = %e, "cannot read history directory");
                return Vec::new();
            }
        };

        let mut records = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    error!(dir = %self.dir.display(), error = %e, "history scan interrupted");
                    break;
                }
            };
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !is_record_name(&name) {
                continue;
            }

            let path = entry.path();
            match read_record(&path).await {
                Ok(run) => records.push(run),
                Err(e) => warn!(file = %name, error = %e, "skipping unreadable history record"),
            }
        }

        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        records
    }
}

fn is_record_name(name: &str) -> bool {
    name.starts_with(RECORD_PREFIX) && name.ends_with(RECORD_EXTENSION)
}

async fn read_record(path: &Path) -> Result<OrchestrationRun> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| OrchaError::persistence(path, e))?;
    Ok(serde_json::from_slice(&raw)?)
}

fn write_record(dir: &Path, base: &str, body: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| OrchaError::persistence(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| OrchaError::persistence(dir, e))?;
    tmp.write_all(body)
        .map_err(|e| OrchaError::persistence(tmp.path(), e))?;

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let path = dir.join(with_suffix(base, attempt));
        match tmp.persist_noclobber(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => tmp = e.file,
            Err(e) => return Err(OrchaError::persistence(&path, e.error)),
        }
    }

    Err(OrchaError::persistence(
        dir.join(base),
        std::io::Error::new(std::io::ErrorKind::AlreadyExists, "no free record name"),
    ))
}

/// Human-readable listing of `records` (expected newest first).
pub fn render_history(records: &[OrchestrationRun]) -> String {
    if records.is_empty() {
        return "No orchestration history found.\n".to_string();
    }

    let mut out = String::new();
    for (i, run) in records.iter().enumerate() {
        let _ = writeln!(out, "--- Orchestration Record {} ---", i + 1);
        let _ = writeln!(out, "  Run ID: {}", run.run_id);
        let _ = writeln!(out, "  Task: {}", run.task);
        let _ = writeln!(out, "  Project Type: {}", run.project_type);
        let _ = writeln!(
            out,
            "  Project Path: {}",
            run.project_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "N/A".to_string())
        );
        let _ = writeln!(out, "  Status: {}", run.status.label().to_uppercase());
        let _ = writeln!(out, "  Start Time: {}", run.started_at.to_rfc3339());
        let _ = writeln!(
            out,
            "  End Time: {}",
            run.ended_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "N/A".to_string())
        );
        let agents: Vec<&str> = run.requested_agents.iter().map(|a| a.as_str()).collect();
        let _ = writeln!(out, "  Agents Requested: {}", agents.join(", "));
        if let Some(details) = &run.error_details {
            let _ = writeln!(out, "  Error: {details}");
        }
        if !run.outcomes.is_empty() {
            let _ = writeln!(out, "  Agent Results:");
            for (agent, outcome) in &run.outcomes {
                match outcome.details() {
                    Some(details) => {
                        let _ = writeln!(
                            out,
                            "    - {agent}: {} ({details})",
                            outcome.label().to_uppercase()
                        );
                    }
                    None => {
                        let _ = writeln!(out, "    - {agent}: {}", outcome.label().to_uppercase());
                    }
                }
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::{AgentId, AgentOutcome, RunStatus};
    use chrono::{DateTime, Utc};

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn run_at(start: &str, task: &str) -> OrchestrationRun {
        let mut run = OrchestrationRun::begin(
            task,
            "python",
            vec![AgentId::from("quantum-agent"), AgentId::from("aider")],
            ts(start),
        );
        run.outcomes
            .insert(AgentId::from("quantum-agent"), AgentOutcome::Success);
        run.outcomes
            .insert(AgentId::from("aider"), AgentOutcome::skipped_unavailable());
        run.finish(ts(start));
        run
    }

    #[test]
    fn test_record_file_names() {
        let mut run = run_at("2026-10-17T09:30:05Z", "t");
        assert_eq!(
            HistoryStore::record_file_name(&run),
            "orchestration_record_20261017-093005.json"
        );

        run.status = RunStatus::CriticalFailure;
        assert_eq!(
            HistoryStore::record_file_name(&run),
            "orchestration_record_20261017-093005_critical_failure.json"
        );
    }

    #[test]
    fn test_is_record_name() {
        assert!(is_record_name("orchestration_record_20261017-093005.json"));
        assert!(is_record_name("orchestration_record_20261017-093005-1.json"));
        assert!(!is_record_name("context.json"));
        assert!(!is_record_name("orchestration_record_x.json.tmp"));
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("does-not-exist"));
        assert!(store.list_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_creates_dir_and_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("memory"));
        let run = run_at("2026-10-17T09:30:05Z", "t");

        let first = store.save(&run).await.unwrap();
        let second = store.save(&run).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(store.list_all().await.len(), 2);
    }

    #[tokio::test]
    async fn test_list_sorted_newest_first_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());

        store.save(&run_at("2026-10-15T08:00:00Z", "oldest")).await.unwrap();
        store.save(&run_at("2026-10-17T08:00:00Z", "newest")).await.unwrap();
        store.save(&run_at("2026-10-16T08:00:00Z", "middle")).await.unwrap();
        std::fs::write(
            dir.path().join("orchestration_record_garbage.json"),
            "{ not a record",
        )
        .unwrap();
        std::fs::write(dir.path().join("context.json"), "{}").unwrap();

        let records = store.list_all().await;
        let tasks: Vec<&str> = records.iter().map(|r| r.task.as_str()).collect();
        assert_eq!(tasks, vec!["newest", "middle", "oldest"]);
    }

    #[test]
    fn test_render_history() {
        let mut run = run_at("2026-10-17T09:30:05Z", "build a parser");
        run.project_path = Some(PathBuf::from("/w/proj"));
        let text = render_history(&[run]);

        assert!(text.contains("--- Orchestration Record 1 ---"));
        assert!(text.contains("Task: build a parser"));
        assert!(text.contains("Project Path: /w/proj"));
        assert!(text.contains("Status: FAILED"));
        assert!(text.contains("Agents Requested: quantum-agent, aider"));
        assert!(text.contains("- aider: SKIPPED (not available)"));
        assert!(text.contains("- quantum-agent: SUCCESS"));
    }

    #[test]
    fn test_render_empty_history() {
        assert_eq!(render_history(&[]), "No orchestration history found.\n");
    }
}
