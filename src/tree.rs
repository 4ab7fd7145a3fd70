//! Declarative project file trees.
//!
//! A [`VirtualFileTree`] maps entry names to either file leaves or nested
//! directories. It serializes to the tagged layout sandbox runtimes expect:
//!
//! ```json
//! {
//!   "package.json": { "file": { "contents": "{ ... }" } },
//!   "src": { "directory": { "main.jsx": { "file": { "contents": "..." } } } }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single entry in a [`VirtualFileTree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileNode {
    /// A file leaf with its complete contents.
    File { contents: String },
    /// A nested directory.
    Directory(VirtualFileTree),
}

/// Immutable description of a project's files and directories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VirtualFileTree {
    entries: BTreeMap<String, FileNode>,
}

impl VirtualFileTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file leaf.
    pub fn with_file(mut self, name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.entries.insert(
            name.into(),
            FileNode::File {
                contents: contents.into(),
            },
        );
        self
    }

    /// Adds a nested directory.
    pub fn with_directory(mut self, name: impl Into<String>, tree: VirtualFileTree) -> Self {
        self.entries.insert(name.into(), FileNode::Directory(tree));
        self
    }

    /// Parses a tree from its JSON document form.
    pub fn from_json(json: &str) -> Result<Self> {
        let tree: Self = serde_json::from_str(json)?;
        tree.validate()?;
        Ok(tree)
    }

    /// Serializes the tree to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Looks up a direct child entry.
    pub fn get(&self, name: &str) -> Option<&FileNode> {
        self.entries.get(name)
    }

    /// Iterates over direct children in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &FileNode)> {
        self.entries.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns every file as a `/`-joined relative path with its contents,
    /// depth first in name order.
    pub fn files(&self) -> Vec<(String, &str)> {
        let mut out = Vec::new();
        self.collect_files("", &mut out);
        out
    }

    /// Number of file leaves in the whole tree.
    pub fn file_count(&self) -> usize {
        self.entries
            .values()
            .map(|node| match node {
                FileNode::File { .. } => 1,
                FileNode::Directory(sub) => sub.file_count(),
            })
            .sum()
    }

    /// Checks that every entry name is a single, plain path segment.
    pub fn validate(&self) -> Result<()> {
        self.validate_at("")
    }

    fn validate_at(&self, prefix: &str) -> Result<()> {
        for (name, node) in &self.entries {
            let path = join(prefix, name);
            if !is_valid_segment(name) {
                return Err(Error::FileProvider(format!(
                    "invalid entry name '{}' at '{}'",
                    name, path
                )));
            }
            if let FileNode::Directory(sub) = node {
                sub.validate_at(&path)?;
            }
        }
        Ok(())
    }

    fn collect_files<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a str)>) {
        for (name, node) in &self.entries {
            let path = join(prefix, name);
            match node {
                FileNode::File { contents } => out.push((path, contents.as_str())),
                FileNode::Directory(sub) => sub.collect_files(&path, out),
            }
        }
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

fn is_valid_segment(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(|c| c == '/' || c == '\\')
}
