//! Backend adapter trait.
//!
//! The capability interface every storage implementation provides. Paths are
//! always relative to the backend's root (`""` is the root itself); the
//! workspace registry strips the mount path before a backend ever sees one.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use canopy_types::{NodeKind, WorkspaceKind};
use serde::{Deserialize, Serialize};

use super::VfsResult;

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub kind: NodeKind,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Create a file entry.
    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::File)
    }

    /// Create a folder entry.
    pub fn folder(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Folder)
    }
}

/// Storage capability interface.
///
/// Every call is fallible and typed; implementations never swallow errors.
/// Only the orchestrator (and the registry, for the initial listing of a
/// local workspace) calls these.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Which workspace type this backend serves.
    fn kind(&self) -> WorkspaceKind;

    /// Kind of the entry at `path`, or `None` if absent.
    async fn stat(&self, path: &Path) -> VfsResult<Option<NodeKind>>;

    /// Direct children of the folder at `path`.
    async fn list(&self, path: &Path) -> VfsResult<Vec<DirEntry>>;

    /// Whole-file read.
    async fn read(&self, path: &Path) -> VfsResult<Vec<u8>>;

    /// Create or replace a file. The parent folder must exist.
    async fn write(&self, path: &Path, data: &[u8]) -> VfsResult<()>;

    /// Create a folder. The parent must exist; fails with `NameConflict`
    /// if anything already lives at `path`.
    async fn mkdir(&self, path: &Path) -> VfsResult<()>;

    /// Remove a file, or a folder with everything below it.
    async fn delete(&self, path: &Path) -> VfsResult<()>;

    /// Rename or move within this backend.
    ///
    /// All-or-nothing: either the whole subtree appears at `to` or nothing
    /// changes. Fails with `NameConflict` if `to` exists.
    async fn rename(&self, from: &Path, to: &Path) -> VfsResult<()>;

    /// Discard all content owned by this backend.
    ///
    /// Virtual stores drop their namespace; local directories are never
    /// touched, so the default does nothing.
    async fn destroy(&self) -> VfsResult<()> {
        Ok(())
    }

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    async fn exists(&self, path: &Path) -> VfsResult<bool> {
        Ok(self.stat(path).await?.is_some())
    }

    /// Every entry below `path`, parents before children.
    ///
    /// Returned paths are relative to the backend root.
    async fn list_recursive(&self, path: &Path) -> VfsResult<Vec<(PathBuf, NodeKind)>> {
        let mut out = Vec::new();
        let mut stack = vec![path.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let entries = self.list(&dir).await?;
            let mut folders = Vec::new();
            for entry in entries {
                let child = dir.join(&entry.name);
                if entry.kind.is_folder() {
                    folders.push(child.clone());
                }
                out.push((child, entry.kind));
            }
            // Reverse so the stack pops folders in listing order.
            stack.extend(folders.into_iter().rev());
        }
        Ok(out)
    }
}
