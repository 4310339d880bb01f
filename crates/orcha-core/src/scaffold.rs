//! Project scaffolding.
//!
//! The scheduler only relies on the contract of [`ProjectScaffolder`]: on
//! success, `logs/` and `memory/` exist under the project path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::artifact::LOGS_DIR;
use crate::config::OrchestratorConfig;
use crate::error::{OrchaError, Result};

/// Directories every project gets.
pub const DEFAULT_STRUCTURE: [&str; 5] = ["src", "tests", "docs", LOGS_DIR, "memory"];

/// Template subdirectory whose markdown files stay under `src/`.
const PARADIGMS_SUBDIR: &str = "paradigms";

/// Creates the on-disk layout of a new project.
#[async_trait]
pub trait ProjectScaffolder: Send + Sync {
    async fn create_project_structure(&self, path: &Path, project_type: &str) -> Result<()>;
}

/// Filesystem scaffolder driven by `project_templates` in the configuration.
#[derive(Debug, Clone)]
pub struct FsScaffolder {
    config: Arc<OrchestratorConfig>,
}

impl FsScaffolder {
    pub fn new(config: Arc<OrchestratorConfig>) -> Self {
        Self { config }
    }

    /// Where a template file lands, relative to the project root.
    fn target_dir(&self, project: &Path, file_name: &str, subdir: Option<&String>) -> PathBuf {
        let src = project.join("src");
        match subdir {
            Some(sub) if file_name.ends_with(".md") && sub != PARADIGMS_SUBDIR => {
                project.join("docs")
            }
            Some(sub) => src.join(sub),
            None => {
                warn!(file = %file_name, "no subdirectory mapped, placing in src/core");
                src.join("core")
            }
        }
    }
}

#[async_trait]
impl ProjectScaffolder for FsScaffolder {
    async fn create_project_structure(&self, path: &Path, project_type: &str) -> Result<()> {
        info!(project_type = %project_type, path = %path.display(), "creating project structure");

        create_dir(path).await?;
        for dir in DEFAULT_STRUCTURE {
            create_dir(&path.join(dir)).await?;
        }

        if let Some(template) = self.config.project_templates.get(project_type) {
            for sub in &template.structure {
                create_dir(&path.join("src").join(sub)).await?;
            }

            for file_name in &template.files {
                let dir = self.target_dir(path, file_name, template.file_to_subdir_map.get(file_name));
                create_dir(&dir).await?;
                let content = self.config.initial_content_for(file_name);
                write_file(&dir.join(file_name), content.as_bytes()).await?;
            }
        } else {
            info!(project_type = %project_type, "no template for project type, using default layout");
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let readme = format!(
            "# {name} - Orchestrated Project\n\nThis project was generated by orcha.\n"
        );
        write_file(&path.join("README.md"), readme.as_bytes()).await?;
        write_file(
            &path.join("requirements.txt"),
            b"smol-developer\naider-chat\nshell-gpt\n",
        )
        .await?;

        info!(path = %path.display(), "project structure created");
        Ok(())
    }
}

async fn create_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| OrchaError::Scaffolding {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })
}

async fn write_file(path: &Path, body: &[u8]) -> Result<()> {
    tokio::fs::write(path, body)
        .await
        .map_err(|e| OrchaError::Scaffolding {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}
