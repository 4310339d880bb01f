//! Orchestrator configuration.
//!
//! Loaded once by the binary and passed by value into the
//! [`AgentRegistry`](crate::agent::AgentRegistry) and
//! [`Orchestrator`](crate::scheduler::Orchestrator).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{OrchaError, Result};

pub const DEFAULT_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_DRAIN_GRACE_MS: u64 = 2_000;
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Layout applied by the scaffolder for one project type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectTemplate {
    /// Subdirectories created under `src/`.
    #[serde(default)]
    pub structure: Vec<String>,
    /// Files written into the project.
    #[serde(default)]
    pub files: Vec<String>,
    /// File name → `src/` subdirectory it belongs to.
    #[serde(default)]
    pub file_to_subdir_map: BTreeMap<String, String>,
}

/// A process-backed agent declared in configuration.
///
/// Each element of `args` may contain the placeholders `{task}` and
/// `{project}`; they are substituted inside that single argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomAgent {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Per-agent wall-clock limit for process-backed agents.
    pub timeout_seconds: u64,
    /// Agents used when the caller does not name any.
    pub default_agents: Vec<String>,
    /// Where orchestration records are kept. Defaults to `<cwd>/memory`.
    pub history_dir: Option<PathBuf>,
    pub project_templates: BTreeMap<String, ProjectTemplate>,
    /// Extension (e.g. `.py`) or `default` → initial file body.
    /// `{file_name}` is replaced with the file's name.
    pub initial_file_contents: BTreeMap<String, String>,
    pub custom_agents: BTreeMap<String, CustomAgent>,
    /// How long to keep draining pipes after a timed-out process is killed.
    pub drain_grace_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            default_agents: vec![
                "smol-developer".to_string(),
                "aider".to_string(),
                "shell-gpt".to_string(),
            ],
            history_dir: None,
            project_templates: BTreeMap::new(),
            initial_file_contents: BTreeMap::new(),
            custom_agents: BTreeMap::new(),
            drain_grace_ms: DEFAULT_DRAIN_GRACE_MS,
        }
    }
}

impl OrchestratorConfig {
    /// Parse a configuration document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, falling back to defaults.
    ///
    /// A missing file is a warning, a malformed one an error; neither stops
    /// the program.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "config file not found, using defaults");
                return Self::default();
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to read config, using defaults");
                return Self::default();
            }
        };

        match Self::from_json(&raw) {
            Ok(config) => {
                info!(path = %path.display(), "configuration loaded");
                config
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "invalid config, using defaults");
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_seconds == 0 {
            return Err(OrchaError::Config(
                "timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if let Some((name, _)) = self
            .custom_agents
            .iter()
            .find(|(_, agent)| agent.program.trim().is_empty())
        {
            return Err(OrchaError::Config(format!(
                "custom agent {name} has an empty program"
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }

    /// History directory, resolved against `cwd` when not configured.
    pub fn history_dir_in(&self, cwd: &Path) -> PathBuf {
        match &self.history_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => cwd.join(dir),
            None => cwd.join("memory"),
        }
    }

    /// Initial body for a scaffolded file, keyed by its extension.
    pub fn initial_content_for(&self, file_name: &str) -> String {
        let ext = Path::new(file_name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let template = self
            .initial_file_contents
            .get(&ext)
            .or_else(|| self.initial_file_contents.get("default"));

        match template {
            Some(t) => t.replace("{file_name}", file_name),
            None => format!("# Initial content for {file_name}\n"),
        }
    }
}
