//! orcha core library
//!
//! Runs a single task against several independent agents concurrently,
//! bounds each invocation by a timeout, and records every run in a durable
//! history.

pub mod agent;
pub mod artifact;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod history;
pub mod obs;
pub mod run;
pub mod scaffold;
pub mod scheduler;
pub mod telemetry;

pub use agent::{
    AgentKind, AgentRegistry, BuiltinAgent, ProcessInvocation, ProcessRecipe, SimulatedAgent,
    SimulatedInvocation, SimulatedOutput, WorkSpec,
};
pub use artifact::{AgentLog, LogStatus, LOGS_DIR};
pub use config::{CustomAgent, OrchestratorConfig, ProjectTemplate, DEFAULT_CONFIG_FILE};
pub use context::{SharedContext, CONTEXT_RELATIVE_PATH};
pub use error::{OrchaError, Result};
pub use executor::{BoundedExecutor, ExecutionReport};
pub use history::{render_history, HistoryStore};
pub use run::{AgentId, AgentOutcome, OrchestrationRun, RunStatus};
pub use scaffold::{FsScaffolder, ProjectScaffolder};
pub use scheduler::{
    resolve_project_path, task_slug, OrchestrationRequest, Orchestrator, DEFAULT_PROJECT_TYPE,
};

pub use obs::{
    emit_agent_finished, emit_agent_started, emit_run_finished, emit_run_started, run_span,
};
pub use telemetry::{init_tracing, DEFAULT_LOG_FILE};

/// orcha version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
