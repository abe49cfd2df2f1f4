//! Renderable tree nodes.
//!
//! A [`TreeNode`] is an owned snapshot handed to consumers (tree view,
//! shell completion). It never aliases the kernel's live index.

use serde::{Deserialize, Serialize};

use crate::workspace::{Classification, WorkspaceKind, WorkspaceStatus};

/// File or folder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Folder,
}

impl NodeKind {
    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::File)
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, NodeKind::Folder)
    }
}

/// Classification flags carried by workspace root nodes.
///
/// Non-root nodes always carry the default (all false).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFlags {
    pub is_workspace: bool,
    pub is_library_workspace: bool,
    pub is_docs_workspace: bool,
    pub is_book_workspace: bool,
    pub is_examples_workspace: bool,
    pub is_projects_workspace: bool,
    pub is_disconnected: bool,
    pub is_local_workspace: bool,
}

impl NodeFlags {
    /// Flags for a workspace root.
    pub fn workspace(
        classification: Classification,
        kind: WorkspaceKind,
        status: WorkspaceStatus,
    ) -> Self {
        Self {
            is_workspace: true,
            is_library_workspace: classification == Classification::Library,
            is_docs_workspace: classification == Classification::Docs,
            is_book_workspace: classification == Classification::Book,
            is_examples_workspace: classification == Classification::Examples,
            is_projects_workspace: classification == Classification::Projects,
            is_disconnected: !status.is_connected(),
            is_local_workspace: kind == WorkspaceKind::Local,
        }
    }

    /// Any read-only classification flag set.
    pub fn is_read_only(&self) -> bool {
        self.is_library_workspace
            || self.is_docs_workspace
            || self.is_book_workspace
            || self.is_examples_workspace
            || self.is_projects_workspace
    }
}

/// Snapshot of one node and its children.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    /// Absolute, `/`-rooted, unique across the tree.
    pub path: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Always empty for files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
    #[serde(flatten)]
    pub flags: NodeFlags,
}

impl TreeNode {
    pub fn file(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: NodeKind::File,
            children: Vec::new(),
            flags: NodeFlags::default(),
        }
    }

    pub fn folder(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: NodeKind::Folder,
            children: Vec::new(),
            flags: NodeFlags::default(),
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }

    /// Depth-first search by absolute path.
    pub fn find(&self, path: &str) -> Option<&TreeNode> {
        if self.path == path {
            return Some(self);
        }
        if !path.starts_with(&self.path) {
            return None;
        }
        self.children.iter().find_map(|c| c.find(path))
    }

    /// Count this node and every descendant.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(TreeNode::count).sum::<usize>()
    }
}
