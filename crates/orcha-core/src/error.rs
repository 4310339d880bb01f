//! Error taxonomy for orchestration.

use std::path::PathBuf;

/// Errors produced by the orchestration core.
///
/// Per-agent variants (`UnknownAgent`, `Invocation`) are always contained to
/// the agent's outcome slot by the scheduler. `Persistence` is logged and
/// never fatal. Anything else reaching the top of a run becomes a critical
/// failure record.
#[derive(Debug, thiserror::Error)]
pub enum OrchaError {
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("agent {agent} could not be invoked: {reason}")]
    Invocation { agent: String, reason: String },

    #[error("project structure creation failed at {path:?}: {reason}")]
    Scaffolding { path: PathBuf, reason: String },

    #[error("failed to persist {path:?}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchaError {
    /// Wrap an I/O error with the path it happened on.
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OrchaError::Persistence {
            path: path.into(),
            source,
        }
    }
}

/// Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, OrchaError>;
