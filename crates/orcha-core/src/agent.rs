//! Agent definitions, resolution and availability.
//!
//! An agent is either process-backed (a program plus an argument recipe) or
//! simulated in-process. Task text and the project path are substituted into
//! discrete argv elements; no shell ever sees them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::context::SharedContext;
use crate::error::{OrchaError, Result};
use crate::run::AgentId;

/// Task text containing this marker (case-insensitive) makes the quantum agent fail.
pub const FAILURE_MARKER: &str = "fail";

/// Key the symbiotic agent writes into the shared context.
pub const OBSERVATION_KEY: &str = "xuabgicos_observations";

/// Builtin process-backed agents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinAgent {
    /// smol-developer --task <task> --path <project>
    SmolDeveloper,

    /// aider --message <task> --dir <project>
    Aider,

    /// shell-gpt --prompt <task> --output-dir <project>
    ShellGpt,
}

impl BuiltinAgent {
    pub const ALL: [BuiltinAgent; 3] = [
        BuiltinAgent::SmolDeveloper,
        BuiltinAgent::Aider,
        BuiltinAgent::ShellGpt,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinAgent::SmolDeveloper => "smol-developer",
            BuiltinAgent::Aider => "aider",
            BuiltinAgent::ShellGpt => "shell-gpt",
        }
    }

    pub fn recipe(&self) -> ProcessRecipe {
        let args: &[&str] = match self {
            BuiltinAgent::SmolDeveloper => &["--task", "{task}", "--path", "{project}"],
            BuiltinAgent::Aider => &["--message", "{task}", "--dir", "{project}"],
            BuiltinAgent::ShellGpt => &["--prompt", "{task}", "--output-dir", "{project}"],
        };
        ProcessRecipe {
            program: self.name().to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Program plus argument templates. `{task}` and `{project}` are replaced
/// inside each argument in a single pass, so substituted text is never
/// re-scanned for placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecipe {
    pub program: String,
    pub args: Vec<String>,
}

impl ProcessRecipe {
    pub fn render(&self, task: &str, project: &Path) -> Vec<String> {
        let project = project.to_string_lossy();
        self.args
            .iter()
            .map(|arg| render_arg(arg, task, &project))
            .collect()
    }
}

fn render_arg(template: &str, task: &str, project: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{task}") {
            out.push_str(task);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{project}") {
            out.push_str(project);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Simulated in-process agents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SimulatedAgent {
    /// Sleeps, then fails iff the task carries [`FAILURE_MARKER`].
    Quantum,

    /// Leaves an observation in the shared context.
    Symbiotic,

    /// Reads the shared context and summarizes it.
    Review,
}

/// What a simulated agent produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedOutput {
    pub success: bool,
    pub message: String,
}

impl SimulatedAgent {
    pub const ALL: [SimulatedAgent; 3] = [
        SimulatedAgent::Quantum,
        SimulatedAgent::Symbiotic,
        SimulatedAgent::Review,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SimulatedAgent::Quantum => "quantum-agent",
            SimulatedAgent::Symbiotic => "xuabgicos-agent",
            SimulatedAgent::Review => "review-agent",
        }
    }

    /// Simulated work time.
    pub fn delay(&self) -> Duration {
        match self {
            SimulatedAgent::Quantum => Duration::from_secs(5),
            SimulatedAgent::Symbiotic => Duration::from_secs(3),
            SimulatedAgent::Review => Duration::from_secs(2),
        }
    }

    pub async fn invoke(&self, task: &str, project: &Path) -> Result<SimulatedOutput> {
        match self {
            SimulatedAgent::Quantum => {
                info!(agent = self.name(), task = %task, "simulating quantum execution");
                tokio::time::sleep(self.delay()).await;
                if task.to_lowercase().contains(FAILURE_MARKER) {
                    warn!(agent = self.name(), task = %task, "simulated failure");
                    Ok(SimulatedOutput {
                        success: false,
                        message: format!("Quantum agent simulated failure for task: {task}"),
                    })
                } else {
                    Ok(SimulatedOutput {
                        success: true,
                        message: format!("Quantum agent simulated success for task: {task}"),
                    })
                }
            }
            SimulatedAgent::Symbiotic => {
                let observation = format!("Symbiotic link established for task: {task}");
                SharedContext::for_project(project)
                    .merge(OBSERVATION_KEY, Value::String(observation.clone()))
                    .await?;
                tokio::time::sleep(self.delay()).await;
                Ok(SimulatedOutput {
                    success: true,
                    message: observation,
                })
            }
            SimulatedAgent::Review => {
                let summary = SharedContext::for_project(project).summarize().await;
                info!(agent = self.name(), "{summary}");
                tokio::time::sleep(self.delay()).await;
                Ok(SimulatedOutput {
                    success: true,
                    message: summary,
                })
            }
        }
    }
}

/// How a known agent is run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentKind {
    Process(ProcessRecipe),
    Simulated(SimulatedAgent),
}

/// A fully resolved process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInvocation {
    pub agent: AgentId,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl ProcessInvocation {
    /// Shell-quoted rendering for logs only; never executed.
    pub fn display_command(&self) -> String {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        shlex::try_join(words.clone()).unwrap_or_else(|_| words.collect::<Vec<_>>().join(" "))
    }
}

/// A resolved simulated invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedInvocation {
    pub agent: AgentId,
    pub behavior: SimulatedAgent,
    pub task: String,
    pub project: PathBuf,
}

/// A runnable unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkSpec {
    Process(ProcessInvocation),
    Simulated(SimulatedInvocation),
}

impl WorkSpec {
    pub fn agent(&self) -> &AgentId {
        match self {
            WorkSpec::Process(p) => &p.agent,
            WorkSpec::Simulated(s) => &s.agent,
        }
    }

    /// Command line as it appears in log artifacts.
    pub fn command_line(&self) -> Option<String> {
        match self {
            WorkSpec::Process(p) => Some(p.display_command()),
            WorkSpec::Simulated(_) => None,
        }
    }
}

/// Known agents by name: the builtins plus any configured custom agents.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: BTreeMap<String, AgentKind>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        let mut agents = BTreeMap::new();
        for builtin in BuiltinAgent::ALL {
            agents.insert(builtin.name().to_string(), AgentKind::Process(builtin.recipe()));
        }
        for sim in SimulatedAgent::ALL {
            agents.insert(sim.name().to_string(), AgentKind::Simulated(sim));
        }
        Self { agents }
    }
}

impl AgentRegistry {
    /// Builtins plus `config.custom_agents`. A custom agent shadows a builtin
    /// of the same name.
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        let mut registry = Self::default();
        for (name, custom) in &config.custom_agents {
            registry.register(
                name.clone(),
                AgentKind::Process(ProcessRecipe {
                    program: custom.program.clone(),
                    args: custom.args.clone(),
                }),
            );
        }
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, kind: AgentKind) {
        let name = name.into();
        if self.agents.insert(name.clone(), kind).is_some() {
            warn!(agent = %name, "agent definition replaced");
        }
    }

    pub fn kind(&self, agent: &AgentId) -> Option<&AgentKind> {
        self.agents.get(agent.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.agents.keys().map(String::as_str)
    }

    /// Build the unit of work for `agent`.
    pub fn resolve(&self, agent: &AgentId, task: &str, project: &Path) -> Result<WorkSpec> {
        match self.kind(agent) {
            Some(AgentKind::Process(recipe)) => Ok(WorkSpec::Process(ProcessInvocation {
                agent: agent.clone(),
                program: recipe.program.clone(),
                args: recipe.render(task, project),
                cwd: project.to_path_buf(),
            })),
            Some(AgentKind::Simulated(behavior)) => Ok(WorkSpec::Simulated(SimulatedInvocation {
                agent: agent.clone(),
                behavior: *behavior,
                task: task.to_string(),
                project: project.to_path_buf(),
            })),
            None => Err(OrchaError::UnknownAgent(agent.to_string())),
        }
    }

    /// Process agents are available when their program is on `PATH`;
    /// simulated agents always are; unknown agents never are.
    pub fn is_available(&self, agent: &AgentId) -> bool {
        match self.kind(agent) {
            Some(AgentKind::Process(recipe)) => match which::which(&recipe.program) {
                Ok(_) => true,
                Err(_) => {
                    warn!(agent = %agent, program = %recipe.program, "agent not found in PATH");
                    false
                }
            },
            Some(AgentKind::Simulated(_)) => true,
            None => {
                warn!(agent = %agent, "unknown agent");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CustomAgent;

    #[test]
    fn test_builtin_names() {
        assert_eq!(BuiltinAgent::SmolDeveloper.name(), "smol-developer");
        assert_eq!(BuiltinAgent::Aider.name(), "aider");
        assert_eq!(BuiltinAgent::ShellGpt.name(), "shell-gpt");
    }

    #[test]
    fn test_builtin_recipes_keep_task_as_one_argument() {
        let project = Path::new("/tmp/proj");
        let task = "fix it\"; rm -rf / #";
        let args = BuiltinAgent::Aider.recipe().render(task, project);
        assert_eq!(args, vec!["--message", task, "--dir", "/tmp/proj"]);

        let args = BuiltinAgent::ShellGpt.recipe().render("t", project);
        assert_eq!(args, vec!["--prompt", "t", "--output-dir", "/tmp/proj"]);
    }

    #[test]
    fn test_render_is_single_pass() {
        assert_eq!(render_arg("{task}", "{project}", "/p"), "{project}");
        assert_eq!(render_arg("--msg={task}!", "hi", "/p"), "--msg=hi!");
        assert_eq!(render_arg("{other} {project}", "t", "/p"), "{other} /p");
        assert_eq!(render_arg("{", "t", "/p"), "{");
    }

    #[test]
    fn test_resolve_process_agent() {
        let registry = AgentRegistry::default();
        let spec = registry
            .resolve(&AgentId::from("smol-developer"), "build", Path::new("/w/p"))
            .unwrap();
        match &spec {
            WorkSpec::Process(p) => {
                assert_eq!(p.program, "smol-developer");
                assert_eq!(p.args, vec!["--task", "build", "--path", "/w/p"]);
                assert_eq!(p.cwd, PathBuf::from("/w/p"));
            }
            other => panic!("expected process spec, got {other:?}"),
        }
        assert_eq!(spec.agent().as_str(), "smol-developer");
    }

    #[test]
    fn test_resolve_simulated_agent() {
        let registry = AgentRegistry::default();
        let spec = registry
            .resolve(&AgentId::from("review-agent"), "t", Path::new("/w"))
            .unwrap();
        assert!(matches!(
            spec,
            WorkSpec::Simulated(SimulatedInvocation {
                behavior: SimulatedAgent::Review,
                ..
            })
        ));
        assert!(spec.command_line().is_none());
    }

    #[test]
    fn test_resolve_unknown_agent_fails() {
        let registry = AgentRegistry::default();
        let err = registry
            .resolve(&AgentId::from("unknown-tool-xyz"), "t", Path::new("/w"))
            .unwrap_err();
        assert!(matches!(err, OrchaError::UnknownAgent(name) if name == "unknown-tool-xyz"));
    }

    #[test]
    fn test_availability() {
        let mut config = OrchestratorConfig::default();
        config.custom_agents.insert(
            "missing-bin".into(),
            CustomAgent {
                program: "definitely-not-installed-orcha-xyz".into(),
                args: vec![],
            },
        );
        config.custom_agents.insert(
            "shell".into(),
            CustomAgent {
                program: "sh".into(),
                args: vec!["-c".into(), "true".into()],
            },
        );
        let registry = AgentRegistry::from_config(&config);

        assert!(registry.is_available(&AgentId::from("quantum-agent")));
        assert!(registry.is_available(&AgentId::from("xuabgicos-agent")));
        assert!(registry.is_available(&AgentId::from("shell")));
        assert!(!registry.is_available(&AgentId::from("missing-bin")));
        assert!(!registry.is_available(&AgentId::from("unknown-tool-xyz")));
    }

    #[test]
    fn test_custom_agent_shadows_builtin() {
        let mut config = OrchestratorConfig::default();
        config.custom_agents.insert(
            "aider".into(),
            CustomAgent {
                program: "/opt/aider/bin/aider".into(),
                args: vec!["--yes".into(), "--message={task}".into()],
            },
        );
        let registry = AgentRegistry::from_config(&config);
        let spec = registry
            .resolve(&AgentId::from("aider"), "go", Path::new("/p"))
            .unwrap();
        let WorkSpec::Process(p) = spec else {
            panic!("expected process spec");
        };
        assert_eq!(p.program, "/opt/aider/bin/aider");
        assert_eq!(p.args, vec!["--yes", "--message=go"]);
    }

    #[test]
    fn test_display_command_quotes_arguments() {
        let invocation = ProcessInvocation {
            agent: AgentId::from("aider"),
            program: "aider".into(),
            args: vec!["--message".into(), "add a parser".into()],
            cwd: PathBuf::from("/p"),
        };
        let rendered = invocation.display_command();
        assert_ne!(rendered, "aider --message add a parser");
        assert_eq!(
            shlex::split(&rendered).unwrap(),
            vec!["aider", "--message", "add a parser"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_quantum_agent_failure_marker() {
        let dir = tempfile::tempdir().unwrap();
        let ok = SimulatedAgent::Quantum
            .invoke("build a parser", dir.path())
            .await
            .unwrap();
        assert!(ok.success);

        let failed = SimulatedAgent::Quantum
            .invoke("Please FAIL this build", dir.path())
            .await
            .unwrap();
        assert!(!failed.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_symbiotic_then_review_round_trip() {
        let dir = tempfile::tempdir().unwrap();

        let wrote = SimulatedAgent::Symbiotic
            .invoke("index the repo", dir.path())
            .await
            .unwrap();
        assert!(wrote.success);

        let review = SimulatedAgent::Review
            .invoke("index the repo", dir.path())
            .await
            .unwrap();
        assert!(review.success);
        assert!(review
            .message
            .contains("Symbiotic link established for task: index the repo"));
    }
}
