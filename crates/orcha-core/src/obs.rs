//! Structured observability hooks for the orchestration lifecycle.
//!
//! This module provides:
//! - A run-scoped tracing span via [`run_span`]
//! - Emission functions for key events: run start, agent skip/start/finish,
//!   run finish, record persistence
//!
//! Events are emitted at `info!` (failures at `warn!`/`error!`). Set
//! `RUST_LOG` to filter and pass `--json` to the CLI for JSON lines.

use std::path::Path;

use tracing::{error, info, warn};

use crate::run::{AgentId, AgentOutcome, RunStatus};

/// Span scoping every event of one run.
///
/// Attach with [`tracing::Instrument`] so it follows the run across await
/// points and into spawned agent tasks:
///
/// ```ignore
/// drive(run).instrument(run_span("20261017-093005")).await;
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("orcha.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, task: &str, agent_count: usize) {
    info!(event = "run.started", run_id = %run_id, task = %task, agents = agent_count);
}

pub fn emit_agent_skipped(agent: &AgentId, reason: &str) {
    warn!(event = "agent.skipped", agent = %agent, reason = %reason);
}

pub fn emit_agent_started(agent: &AgentId, task: &str, command: Option<&str>) {
    info!(
        event = "agent.started",
        agent = %agent,
        task = %task,
        command = command.unwrap_or("(simulated)"),
    );
}

/// Emit event: agent reached a terminal outcome.
pub fn emit_agent_finished(agent: &AgentId, outcome: &AgentOutcome, log_path: Option<&Path>) {
    let log = log_path.map(|p| p.display().to_string()).unwrap_or_default();
    if outcome.is_success() {
        info!(event = "agent.finished", agent = %agent, outcome = outcome.label(), log = %log);
    } else {
        warn!(
            event = "agent.finished",
            agent = %agent,
            outcome = outcome.label(),
            details = outcome.details().unwrap_or(""),
            log = %log,
        );
    }
}

pub fn emit_run_finished(run_id: &str, status: RunStatus, duration_ms: u64, ran: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        status = status.label(),
        duration_ms = duration_ms,
        agents_run = ran,
    );
}

pub fn emit_record_saved(path: &Path) {
    info!(event = "record.saved", path = %path.display());
}

/// Emit event: a log artifact or history record could not be written.
/// Persistence failures never change a run's outcome.
pub fn emit_persist_error(what: &str, error: &dyn std::fmt::Display) {
    error!(event = "persist.error", what = %what, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let span = run_span("test-run-id");
        let _guard = span.enter();
        emit_agent_finished(&AgentId::from("a"), &AgentOutcome::TimedOut, None);
    }
}
