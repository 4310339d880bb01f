//! orcha - concurrent multi-agent task orchestration
//!
//! ## Commands
//!
//! - `orchestrate`: run one task against several agents in a fresh project
//! - `history`: list past orchestration runs, newest first

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use orcha_core::{
    render_history, HistoryStore, OrchestrationRequest, OrchestrationRun, Orchestrator,
    OrchestratorConfig, DEFAULT_CONFIG_FILE, DEFAULT_LOG_FILE, DEFAULT_PROJECT_TYPE,
};

#[derive(Parser)]
#[command(name = "orcha")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run one task against several coding agents concurrently", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file
    #[arg(long, global = true, env = "ORCHA_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// File that every log line is appended to
    #[arg(long, global = true, env = "ORCHA_LOG_FILE", default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Log to the console only
    #[arg(long, global = true)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task against a set of agents
    Orchestrate {
        /// Task description handed to every agent
        #[arg(short, long)]
        task: String,

        /// Project template to scaffold
        #[arg(short = 'p', long, default_value = DEFAULT_PROJECT_TYPE)]
        project_type: String,

        /// Agents to run (default: `default_agents` from the config)
        #[arg(short, long, num_args = 1..)]
        agents: Vec<String>,

        /// Directory in which the project directory is created
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,

        /// Explicit project directory, relative to the workspace
        #[arg(long)]
        project_path: Option<PathBuf>,

        /// Per-agent timeout in seconds (default: `timeout_seconds` from the config)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show orchestration history
    History,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let log_file = (!cli.no_log_file).then_some(cli.log_file.as_path());
    orcha_core::init_tracing(cli.json, level, log_file);

    let config = OrchestratorConfig::load(&cli.config);
    let cwd = std::env::current_dir().context("Failed to resolve current directory")?;
    let history = HistoryStore::new(config.history_dir_in(&cwd));

    match cli.command {
        Commands::Orchestrate {
            task,
            project_type,
            agents,
            workspace,
            project_path,
            timeout,
        } => {
            let agents = if agents.is_empty() {
                config.default_agents.clone()
            } else {
                agents
            };
            let mut request = OrchestrationRequest::new(task, workspace)
                .with_project_type(project_type)
                .with_agents(agents);
            if let Some(path) = project_path {
                request = request.with_project_path(path);
            }
            if let Some(secs) = timeout {
                anyhow::ensure!(secs > 0, "--timeout must be greater than zero");
                request = request.with_timeout(Duration::from_secs(secs));
            }
            cmd_orchestrate(Orchestrator::new(config, history), request).await
        }
        Commands::History => cmd_history(&history).await,
    }
}

async fn cmd_orchestrate(orchestrator: Orchestrator, request: OrchestrationRequest) -> Result<()> {
    info!(
        task = %request.task,
        agents = request.agents.len(),
        "starting orchestration"
    );
    let run = orchestrator.run(request).await;
    print!("{}", render_summary(&run, orchestrator.history().dir()));
    Ok(())
}

async fn cmd_history(history: &HistoryStore) -> Result<()> {
    let records = history.list_all().await;
    print!("{}", render_history(&records));
    Ok(())
}

fn render_summary(run: &OrchestrationRun, history_dir: &Path) -> String {
    let mut out = String::new();
    out.push_str(&format!("Orchestration {} finished: {}\n", run.run_id, run.status));
    if let Some(path) = &run.project_path {
        out.push_str(&format!("  Project: {}\n", path.display()));
    }
    out.push_str(&format!(
        "  Agents: {} requested, {} ran, {} succeeded\n",
        run.requested_agents.len(),
        run.ran_count(),
        run.succeeded_count()
    ));
    for (agent, outcome) in &run.outcomes {
        out.push_str(&format!("    {}: {}", agent, outcome.label()));
        if let Some(details) = outcome.details() {
            out.push_str(&format!(" ({details})"));
        }
        out.push('\n');
    }
    if let Some(details) = &run.error_details {
        out.push_str(&format!("  Error: {details}\n"));
    }
    out.push_str(&format!("  History: {}\n", history_dir.display()));
    out
}
