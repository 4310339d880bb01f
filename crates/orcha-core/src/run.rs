//! Orchestration run records and per-agent outcomes.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format used for run ids and every timestamp embedded in a file name.
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Opaque agent identifier, e.g. `aider` or `quantum-agent`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Terminal classification of one agent's participation in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentOutcome {
    Success,
    Failed,
    TimedOut,
    Error { details: String },
    Skipped { reason: String },
}

impl AgentOutcome {
    pub fn skipped_unavailable() -> Self {
        AgentOutcome::Skipped {
            reason: "not available".to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AgentOutcome::Success)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, AgentOutcome::Skipped { .. })
    }

    /// Lower-case label used in logs and history listings.
    pub fn label(&self) -> &'static str {
        match self {
            AgentOutcome::Success => "success",
            AgentOutcome::Failed => "failed",
            AgentOutcome::TimedOut => "timed_out",
            AgentOutcome::Error { .. } => "error",
            AgentOutcome::Skipped { .. } => "skipped",
        }
    }

    /// Error details or skip reason, if any.
    pub fn details(&self) -> Option<&str> {
        match self {
            AgentOutcome::Error { details } => Some(details),
            AgentOutcome::Skipped { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Overall status of an orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Not yet finalized.
    Pending,
    Success,
    Failed,
    NoAgentsRun,
    #[serde(rename = "failed_structure_creation")]
    StructureCreationFailed,
    CriticalFailure,
}

impl RunStatus {
    /// Aggregate per-agent outcomes into an overall status.
    ///
    /// `Success` requires at least one agent to have run and every recorded
    /// outcome (skipped ones included) to be `Success`. If nothing ran the
    /// status is `NoAgentsRun`.
    pub fn aggregate(outcomes: &BTreeMap<AgentId, AgentOutcome>) -> Self {
        let ran = outcomes.values().filter(|o| !o.is_skipped()).count();
        if ran == 0 {
            return RunStatus::NoAgentsRun;
        }
        if outcomes.values().all(AgentOutcome::is_success) {
            RunStatus::Success
        } else {
            RunStatus::Failed
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::NoAgentsRun => "no_agents_run",
            RunStatus::StructureCreationFailed => "failed_structure_creation",
            RunStatus::CriticalFailure => "critical_failure",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The full record of one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationRun {
    #[serde(default)]
    pub run_id: String,
    pub task: String,
    pub project_type: String,
    #[serde(rename = "agents_requested")]
    pub requested_agents: Vec<AgentId>,
    pub project_path: Option<PathBuf>,
    #[serde(rename = "timestamp_start")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "timestamp_end")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(rename = "agent_results", default)]
    pub outcomes: BTreeMap<AgentId, AgentOutcome>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl OrchestrationRun {
    /// Start a new run record; the run id is derived from `started_at`.
    pub fn begin(
        task: impl Into<String>,
        project_type: impl Into<String>,
        requested_agents: Vec<AgentId>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: started_at.format(FILE_TIMESTAMP_FORMAT).to_string(),
            task: task.into(),
            project_type: project_type.into(),
            requested_agents,
            project_path: None,
            started_at,
            ended_at: None,
            outcomes: BTreeMap::new(),
            status: RunStatus::Pending,
            error_details: None,
        }
    }

    /// Number of agents that were actually launched.
    pub fn ran_count(&self) -> usize {
        self.outcomes.values().filter(|o| !o.is_skipped()).count()
    }

    pub fn succeeded_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_success()).count()
    }

    pub fn is_critical(&self) -> bool {
        self.status == RunStatus::CriticalFailure
    }

    /// Stamp `ended_at` and derive the status from the collected outcomes.
    pub fn finish(&mut self, ended_at: DateTime<Utc>) {
        self.status = RunStatus::aggregate(&self.outcomes);
        self.ended_at = Some(ended_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcomes(items: &[(&str, AgentOutcome)]) -> BTreeMap<AgentId, AgentOutcome> {
        items
            .iter()
            .map(|(name, o)| (AgentId::from(*name), o.clone()))
            .collect()
    }

    #[test]
    fn test_aggregate_all_success() {
        let o = outcomes(&[
            ("aider", AgentOutcome::Success),
            ("quantum-agent", AgentOutcome::Success),
        ]);
        assert_eq!(RunStatus::aggregate(&o), RunStatus::Success);
    }

    #[test]
    fn test_aggregate_empty_is_no_agents_run() {
        assert_eq!(
            RunStatus::aggregate(&BTreeMap::new()),
            RunStatus::NoAgentsRun
        );
    }

    #[test]
    fn test_aggregate_all_skipped_is_no_agents_run() {
        let o = outcomes(&[
            ("aider", AgentOutcome::skipped_unavailable()),
            ("unknown-tool-xyz", AgentOutcome::skipped_unavailable()),
        ]);
        assert_eq!(RunStatus::aggregate(&o), RunStatus::NoAgentsRun);
    }

    #[test]
    fn test_aggregate_timeout_is_failed() {
        let o = outcomes(&[
            ("aider", AgentOutcome::TimedOut),
            ("quantum-agent", AgentOutcome::Success),
        ]);
        assert_eq!(RunStatus::aggregate(&o), RunStatus::Failed);
    }

    #[test]
    fn test_aggregate_skipped_sibling_blocks_success() {
        let o = outcomes(&[
            ("aider", AgentOutcome::skipped_unavailable()),
            ("quantum-agent", AgentOutcome::Success),
        ]);
        assert_eq!(RunStatus::aggregate(&o), RunStatus::Failed);
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let v = serde_json::to_value(AgentOutcome::skipped_unavailable()).unwrap();
        assert_eq!(v, json!({"status": "skipped", "reason": "not available"}));

        let v = serde_json::to_value(AgentOutcome::Error {
            details: "boom".into(),
        })
        .unwrap();
        assert_eq!(v, json!({"status": "error", "details": "boom"}));

        let v = serde_json::to_value(AgentOutcome::TimedOut).unwrap();
        assert_eq!(v, json!({"status": "timed_out"}));
    }

    #[test]
    fn test_run_record_uses_history_field_names() {
        let started = DateTime::parse_from_rfc3339("2026-10-17T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut run = OrchestrationRun::begin(
            "build a parser",
            "python",
            vec![AgentId::from("quantum-agent")],
            started,
        );
        run.outcomes
            .insert(AgentId::from("quantum-agent"), AgentOutcome::Success);
        run.finish(started);

        let v = serde_json::to_value(&run).unwrap();
        assert_eq!(v["run_id"], "20261017-093000");
        assert_eq!(v["agents_requested"], json!(["quantum-agent"]));
        assert_eq!(v["agent_results"]["quantum-agent"]["status"], "success");
        assert_eq!(v["status"], "success");
        assert!(v["timestamp_start"].as_str().unwrap().starts_with("2026-10-17T09:30:00"));
        assert!(v.get("error_details").is_none());
    }

    #[test]
    fn test_structure_failure_label() {
        let v = serde_json::to_value(RunStatus::StructureCreationFailed).unwrap();
        assert_eq!(v, json!("failed_structure_creation"));
        assert_eq!(
            RunStatus::StructureCreationFailed.to_string(),
            "failed_structure_creation"
        );
    }
}
