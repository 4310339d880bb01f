//! Shared context file: the breadcrumb store agents use to talk to each other.
//!
//! Lives at `<project>/memory/context.json` and holds one JSON object. A
//! missing, unreadable or malformed file reads as `{}`.
//!
//! There is no locking. Two agents merging concurrently race and the last
//! writer wins. Each write replaces the file atomically (temp file + rename
//! in the same directory), so a reader sees either the old or the new
//! document, never a torn one.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{OrchaError, Result};

pub const CONTEXT_RELATIVE_PATH: &str = "memory/context.json";

/// Handle to one project's shared context file.
#[derive(Debug, Clone)]
pub struct SharedContext {
    path: PathBuf,
}

impl SharedContext {
    pub fn for_project(project: &Path) -> Self {
        Self {
            path: project.join(CONTEXT_RELATIVE_PATH),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the context object. Never fails.
    pub async fn load(&self) -> Map<String, Value> {
        self.read_object().await.unwrap_or_default()
    }

    async fn read_object(&self) -> Option<Map<String, Value>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "shared context not readable");
                return None;
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Some(map),
            Ok(_) => {
                warn!(path = %self.path.display(), "shared context is not a JSON object, ignoring");
                None
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "malformed shared context, ignoring");
                None
            }
        }
    }

    /// Set `key` to `value`, keeping every other key, and rewrite the file.
    pub async fn merge(&self, key: &str, value: Value) -> Result<()> {
        let mut context = self.load().await;
        context.insert(key.to_string(), value);
        let body = serde_json::to_vec_pretty(&Value::Object(context))?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || replace_file(&path, &body))
            .await
            .map_err(|e| OrchaError::Io(std::io::Error::other(e)))?
    }

    /// Human-readable summary of the whole context.
    pub async fn summarize(&self) -> String {
        match self.read_object().await {
            Some(map) => {
                let pretty = serde_json::to_string_pretty(&Value::Object(map))
                    .unwrap_or_else(|_| "{}".to_string());
                format!("Review of shared context: {pretty}")
            }
            None => "No context to review.".to_string(),
        }
    }
}

fn replace_file(path: &Path, body: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| OrchaError::Config(format!("{} has no parent", path.display())))?;
    std::fs::create_dir_all(dir).map_err(|e| OrchaError::persistence(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| OrchaError::persistence(dir, e))?;
    tmp.write_all(body)
        .map_err(|e| OrchaError::persistence(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| OrchaError::persistence(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = SharedContext::for_project(dir.path());
        assert!(ctx.load().await.is_empty());
        assert_eq!(ctx.summarize().await, "No context to review.");
    }

    #[tokio::test]
    async fn test_merge_creates_file_and_parent() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = SharedContext::for_project(dir.path());

        ctx.merge("note", json!("hello")).await.unwrap();

        assert!(dir.path().join("memory/context.json").exists());
        assert_eq!(ctx.load().await["note"], json!("hello"));
    }

    #[tokio::test]
    async fn test_merge_keeps_existing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = SharedContext::for_project(dir.path());

        ctx.merge("a", json!(1)).await.unwrap();
        ctx.merge("b", json!(2)).await.unwrap();
        ctx.merge("a", json!(3)).await.unwrap();

        let map = ctx.load().await;
        assert_eq!(map.len(), 2);
        assert_eq!(map["a"], json!(3));
        assert_eq!(map["b"], json!(2));
    }

    #[tokio::test]
    async fn test_malformed_file_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("memory")).unwrap();
        std::fs::write(dir.path().join(CONTEXT_RELATIVE_PATH), "{ broken").unwrap();

        let ctx = SharedContext::for_project(dir.path());
        assert!(ctx.load().await.is_empty());
        assert_eq!(ctx.summarize().await, "No context to review.");

        ctx.merge("k", json!("v")).await.unwrap();
        assert_eq!(ctx.load().await["k"], json!("v"));
    }

    #[tokio::test]
    async fn test_non_object_document_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("memory")).unwrap();
        std::fs::write(dir.path().join(CONTEXT_RELATIVE_PATH), "[1, 2, 3]").unwrap();

        let ctx = SharedContext::for_project(dir.path());
        assert!(ctx.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_summary_contains_values() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = SharedContext::for_project(dir.path());
        ctx.merge("observation", json!("tests are green")).await.unwrap();

        let summary = ctx.summarize().await;
        assert!(summary.starts_with("Review of shared context:"));
        assert!(summary.contains("tests are green"));
    }
}
