//! Virtual file tree providers.
//!
//! A provider supplies the project that gets mounted into the sandbox at the
//! start of every attempt. Failures surface as [`Error::FileProvider`] so the
//! orchestrator can abort before the sandbox is touched.

mod template;

pub use template::TemplateProvider;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::tree::VirtualFileTree;

/// Source of the project tree for an attempt.
#[async_trait]
pub trait TreeProvider: Send + Sync {
    /// Produces the tree to mount.
    async fn get(&self) -> Result<VirtualFileTree>;

    /// Returns the name of this provider.
    fn name(&self) -> &str;
}

/// Serves a fixed in-memory tree.
#[derive(Debug, Clone)]
pub struct StaticTreeProvider {
    tree: VirtualFileTree,
}

impl StaticTreeProvider {
    pub fn new(tree: VirtualFileTree) -> Self {
        Self { tree }
    }
}

#[async_trait]
impl TreeProvider for StaticTreeProvider {
    async fn get(&self) -> Result<VirtualFileTree> {
        self.tree
            .validate()
            .map_err(|e| Error::FileProvider(e.to_string()))?;
        Ok(self.tree.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Reads a tree document (tagged JSON) from disk on every call.
#[derive(Debug, Clone)]
pub struct JsonFileProvider {
    path: PathBuf,
}

impl JsonFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl TreeProvider for JsonFileProvider {
    async fn get(&self) -> Result<VirtualFileTree> {
        let json = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::FileProvider(format!("failed to read {}: {}", self.path.display(), e))
        })?;

        tracing::debug!(path = ?self.path, bytes = json.len(), "loaded tree document");

        VirtualFileTree::from_json(&json).map_err(|e| match e {
            Error::FileProvider(msg) => Error::FileProvider(msg),
            other => Error::FileProvider(format!("{}: {}", self.path.display(), other)),
        })
    }

    fn name(&self) -> &str {
        "json-file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn static_provider_returns_its_tree() {
        let tree = VirtualFileTree::new().with_file("index.html", "<html></html>");
        let provider = StaticTreeProvider::new(tree.clone());

        assert_eq!(provider.get().await.unwrap(), tree);
        assert_eq!(provider.name(), "static");
    }

    #[tokio::test]
    async fn static_provider_rejects_invalid_tree() {
        let provider = StaticTreeProvider::new(VirtualFileTree::new().with_file("../x", ""));

        let err = provider.get().await.unwrap_err();
        assert!(matches!(err, Error::FileProvider(_)));
    }

    #[tokio::test]
    async fn json_provider_reads_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tree.json");
        std::fs::write(&path, r#"{ "a.txt": { "file": { "contents": "hi" } } }"#).unwrap();

        let tree = JsonFileProvider::new(&path).get().await.unwrap();

        assert_eq!(tree.files(), vec![("a.txt".to_string(), "hi")]);
    }

    #[tokio::test]
    async fn json_provider_wraps_missing_file() {
        let dir = TempDir::new().unwrap();
        let provider = JsonFileProvider::new(dir.path().join("missing.json"));

        let err = provider.get().await.unwrap_err();
        assert!(matches!(err, Error::FileProvider(msg) if msg.contains("missing.json")));
    }

    #[tokio::test]
    async fn json_provider_wraps_malformed_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tree.json");
        std::fs::write(&path, "not json").unwrap();

        let err = JsonFileProvider::new(&path).get().await.unwrap_err();
        assert!(matches!(err, Error::FileProvider(_)));
    }
}
