//! Orchestration scheduler: fan one task out to many agents and record the run.
//!
//! Every available agent is launched as its own tokio task against the same
//! project directory. Agents never talk to each other directly; the shared
//! filesystem (notably the shared context file) is their only channel.
//! A failing, timing-out or panicking agent only affects its own outcome
//! slot. Outcomes are joined by agent key, not by completion order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{error, warn, Instrument};

use crate::agent::{AgentRegistry, WorkSpec};
use crate::artifact::{AgentLog, LOGS_DIR};
use crate::config::OrchestratorConfig;
use crate::error::{OrchaError, Result};
use crate::executor::BoundedExecutor;
use crate::history::HistoryStore;
use crate::obs;
use crate::run::{AgentId, AgentOutcome, OrchestrationRun, RunStatus, FILE_TIMESTAMP_FORMAT};
use crate::scaffold::{FsScaffolder, ProjectScaffolder};

pub const DEFAULT_PROJECT_TYPE: &str = "revolution";
pub const PROJECT_DIR_PREFIX: &str = "orchestrated-project-";
pub const MAX_SLUG_CHARS: usize = 50;

/// Inputs of one orchestration run.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestrationRequest {
    pub task: String,
    pub project_type: String,
    /// Requested agents, in order. Duplicates run once.
    pub agents: Vec<AgentId>,
    /// Base directory; generated project directories are created inside it.
    pub workspace: PathBuf,
    /// Explicit project directory, relative to `workspace` unless absolute.
    pub project_path: Option<PathBuf>,
    /// Overrides the configured per-agent timeout.
    pub timeout: Option<Duration>,
}

impl OrchestrationRequest {
    pub fn new(task: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            task: task.into(),
            project_type: DEFAULT_PROJECT_TYPE.to_string(),
            agents: Vec::new(),
            workspace: workspace.into(),
            project_path: None,
            timeout: None,
        }
    }

    pub fn with_agents<I, A>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<AgentId>,
    {
        self.agents = agents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_project_type(mut self, project_type: impl Into<String>) -> Self {
        self.project_type = project_type.into();
        self
    }

    pub fn with_project_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_path = Some(path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Runs orchestration requests and hands each finished run to the history store.
pub struct Orchestrator {
    config: Arc<OrchestratorConfig>,
    registry: Arc<AgentRegistry>,
    executor: BoundedExecutor,
    scaffolder: Arc<dyn ProjectScaffolder>,
    history: HistoryStore,
}

impl Orchestrator {
    /// Build an orchestrator with the filesystem scaffolder and the agent
    /// registry derived from `config`.
    pub fn new(config: OrchestratorConfig, history: HistoryStore) -> Self {
        let config = Arc::new(config);
        Self {
            registry: Arc::new(AgentRegistry::from_config(&config)),
            executor: BoundedExecutor::from_config(&config),
            scaffolder: Arc::new(FsScaffolder::new(Arc::clone(&config))),
            config,
            history,
        }
    }

    pub fn with_scaffolder(mut self, scaffolder: Arc<dyn ProjectScaffolder>) -> Self {
        self.scaffolder = scaffolder;
        self
    }

    pub fn with_registry(mut self, registry: AgentRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Execute one orchestration run.
    ///
    /// Never fails: agent failures land in the per-agent outcomes, a
    /// scaffolding failure yields `StructureCreationFailed`, and anything
    /// else yields a `CriticalFailure` record carrying what was known. The
    /// record is persisted before returning; persistence errors are logged.
    pub async fn run(&self, request: OrchestrationRequest) -> OrchestrationRun {
        let start = Instant::now();
        let mut run = OrchestrationRun::begin(
            request.task.clone(),
            request.project_type.clone(),
            request.agents.clone(),
            Utc::now(),
        );
        let span = obs::run_span(&run.run_id);

        async {
            if let Err(e) = self.drive(&request, &mut run).await {
                error!(
                    task = %request.task,
                    error = %e,
                    "unhandled critical error during orchestration"
                );
                run.status = RunStatus::CriticalFailure;
                run.ended_at = Some(Utc::now());
                run.error_details = Some(e.to_string());
            }

            obs::emit_run_finished(
                &run.run_id,
                run.status,
                start.elapsed().as_millis() as u64,
                run.ran_count(),
            );

            match self.history.save(&run).await {
                Ok(path) => obs::emit_record_saved(&path),
                Err(e) => obs::emit_persist_error("orchestration record", &e),
            }
        }
        .instrument(span)
        .await;

        run
    }

    async fn drive(&self, request: &OrchestrationRequest, run: &mut OrchestrationRun) -> Result<()> {
        let project = resolve_project_path(
            &request.workspace,
            request.project_path.as_deref(),
            &request.task,
            run.started_at,
        )?;
        run.project_path = Some(project.clone());

        obs::emit_run_started(&run.run_id, &request.task, request.agents.len());

        tokio::fs::create_dir_all(&request.workspace)
            .await
            .map_err(|e| OrchaError::persistence(&request.workspace, e))?;

        if let Err(e) = self
            .scaffolder
            .create_project_structure(&project, &request.project_type)
            .await
        {
            error!(
                project = %project.display(),
                error = %e,
                "project structure creation failed, aborting orchestration"
            );
            run.status = RunStatus::StructureCreationFailed;
            run.ended_at = Some(Utc::now());
            return Ok(());
        }

        let timeout = request.timeout.unwrap_or_else(|| self.config.timeout());
        let logs_dir = project.join(LOGS_DIR);

        let mut seen = HashSet::new();
        let mut launched = Vec::new();
        for agent in &request.agents {
            if !seen.insert(agent.clone()) {
                warn!(agent = %agent, "agent requested more than once, running it once");
                continue;
            }

            if !self.registry.is_available(agent) {
                let outcome = AgentOutcome::skipped_unavailable();
                obs::emit_agent_skipped(agent, outcome.details().unwrap_or_default());
                run.outcomes.insert(agent.clone(), outcome);
                continue;
            }

            let spec = match self.registry.resolve(agent, &request.task, &project) {
                Ok(spec) => spec,
                Err(e) => {
                    obs::emit_agent_skipped(agent, &e.to_string());
                    run.outcomes
                        .insert(agent.clone(), AgentOutcome::skipped_unavailable());
                    continue;
                }
            };

            let handle = tokio::spawn(
                run_agent(
                    self.executor.clone(),
                    spec,
                    request.task.clone(),
                    logs_dir.clone(),
                    timeout,
                )
                .in_current_span(),
            );
            launched.push((agent.clone(), handle));
        }

        for (agent, outcome) in join_outcomes(launched, &request.task).await {
            run.outcomes.insert(agent, outcome);
        }

        run.finish(Utc::now());
        Ok(())
    }
}

/// Wait for every launched agent and pair each outcome with its agent.
///
/// A task that panicked or was cancelled becomes that agent's `Error`
/// outcome; its siblings are unaffected.
async fn join_outcomes(
    launched: Vec<(AgentId, JoinHandle<AgentOutcome>)>,
    task: &str,
) -> Vec<(AgentId, AgentOutcome)> {
    let (agents, handles): (Vec<_>, Vec<_>) = launched.into_iter().unzip();
    let results = join_all(handles).await;

    agents
        .into_iter()
        .zip(results)
        .map(|(agent, result)| {
            let outcome = result.unwrap_or_else(|e| {
                error!(agent = %agent, task = %task, error = %e, "agent task aborted");
                AgentOutcome::Error {
                    details: format!("agent task aborted: {e}"),
                }
            });
            (agent, outcome)
        })
        .collect()
}

/// Run one agent to a terminal outcome and write its log artifact.
async fn run_agent(
    executor: BoundedExecutor,
    spec: WorkSpec,
    task: String,
    logs_dir: PathBuf,
    timeout: Duration,
) -> AgentOutcome {
    let agent = spec.agent().clone();
    let command = spec.command_line();
    obs::emit_agent_started(&agent, &task, command.as_deref());

    let (outcome, log) = match executor.execute(&spec, timeout).await {
        Ok(report) => (report.outcome(), AgentLog::from_report(&report, &task)),
        Err(e) => {
            error!(
                agent = %agent,
                task = %task,
                command = command.as_deref().unwrap_or("(simulated)"),
                error = %e,
                "error running agent"
            );
            let log = AgentLog::from_error(&agent, &task, command.clone(), &e);
            (
                AgentOutcome::Error {
                    details: e.to_string(),
                },
                log,
            )
        }
    };

    let log_path = match log.write(&logs_dir, Utc::now()).await {
        Ok(path) => Some(path),
        Err(e) => {
            obs::emit_persist_error("agent log", &e);
            None
        }
    };

    obs::emit_agent_finished(&agent, &outcome, log_path.as_deref());
    outcome
}

/// Absolute project directory for a run.
///
/// Explicit paths are joined onto the workspace. Otherwise the directory is
/// `orchestrated-project-<slug>-<YYYYmmdd-HHMMSS>` inside the workspace, so
/// repeated runs of the same task never share a directory.
pub fn resolve_project_path(
    workspace: &Path,
    project_path: Option<&Path>,
    task: &str,
    at: DateTime<Utc>,
) -> Result<PathBuf> {
    let workspace = if workspace.is_absolute() {
        workspace.to_path_buf()
    } else {
        std::env::current_dir()?.join(workspace)
    };

    Ok(match project_path {
        Some(path) => workspace.join(path),
        None => workspace.join(format!(
            "{PROJECT_DIR_PREFIX}{}-{}",
            task_slug(task),
            at.format(FILE_TIMESTAMP_FORMAT)
        )),
    })
}

/// Lower-cased task with everything but alphanumerics, `-` and `_` mapped to
/// `-`, truncated to [`MAX_SLUG_CHARS`] characters.
pub fn task_slug(task: &str) -> String {
    task.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .take(MAX_SLUG_CHARS)
        .collect()
}
