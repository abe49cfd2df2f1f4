//! Local directory backend.
//!
//! Provides access to a user-granted directory through its
//! [`DirectoryHandle`], with path security to prevent escaping the root.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use canopy_types::{NodeKind, WorkspaceKind};
use tokio::fs;
use tracing::debug;

use crate::vfs::backend::{Backend, DirEntry};
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::handle::DirectoryHandle;

/// Local directory backend.
///
/// All operations are relative to the handle's root. For example, if the
/// root is `/home/amy/project`, then `read("src/main.lua")` reads
/// `/home/amy/project/src/main.lua`.
///
/// Every call first checks that access is still granted, so a revoked
/// handle fails with `PermissionDenied` before touching the disk.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    handle: DirectoryHandle,
}

impl LocalBackend {
    pub fn new(handle: DirectoryHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &DirectoryHandle {
        &self.handle
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        self.handle.root()
    }

    /// Resolve a relative path to an absolute path within the root.
    ///
    /// `..` components are rejected outright rather than resolved, and the
    /// deepest existing ancestor is canonicalized so a symlink pointing out
    /// of the root is caught as well.
    fn resolve(&self, path: &Path) -> VfsResult<PathBuf> {
        self.handle.check_access()?;

        let mut full = self.root().to_path_buf();
        for component in path.components() {
            match component {
                Component::Normal(s) => full.push(s),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(VfsError::invalid_path(path.display().to_string()));
                }
            }
        }

        // Canonicalize to resolve symlinks. For non-existent paths, check
        // the nearest existing ancestor instead.
        let mut probe = full.as_path();
        let canonical = loop {
            if probe.exists() {
                break dunce::canonicalize(probe).map_err(|e| VfsError::from_io(e, path))?;
            }
            match probe.parent() {
                Some(parent) => probe = parent,
                None => break self.root().to_path_buf(),
            }
        };

        // Verify we haven't escaped the root
        if !canonical.starts_with(self.root()) {
            return Err(VfsError::invalid_path(format!(
                "{} is not under {}",
                canonical.display(),
                self.root().display()
            )));
        }

        Ok(full)
    }

    /// Symlinks are listed only when they point at a file inside the root.
    ///
    /// Folder links are never traversed, and dangling, looping or escaping
    /// links are left out of listings.
    async fn symlink_kind(&self, link: &Path) -> Option<NodeKind> {
        let target = match fs::canonicalize(link).await {
            Ok(target) => dunce::simplified(&target).to_path_buf(),
            Err(e) => {
                debug!(link = %link.display(), error = %e, "skipping unresolvable symlink");
                return None;
            }
        };
        if !target.starts_with(self.root()) {
            debug!(link = %link.display(), "skipping symlink outside the root");
            return None;
        }
        match fs::metadata(&target).await {
            Ok(meta) if meta.is_file() => Some(NodeKind::File),
            _ => None,
        }
    }

    fn kind_of(file_type: &std::fs::FileType) -> NodeKind {
        if file_type.is_dir() {
            NodeKind::Folder
        } else {
            NodeKind::File
        }
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn kind(&self) -> WorkspaceKind {
        WorkspaceKind::Local
    }

    async fn stat(&self, path: &Path) -> VfsResult<Option<NodeKind>> {
        let full_path = self.resolve(path)?;
        match fs::metadata(&full_path).await {
            Ok(meta) => Ok(Some(Self::kind_of(&meta.file_type()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VfsError::from_io(e, path)),
        }
    }

    async fn list(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let full_path = self.resolve(path)?;
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&full_path)
            .await
            .map_err(|e| VfsError::from_io(e, path))?;

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| VfsError::from_io(e, path))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| VfsError::from_io(e, path))?;
            let kind = if file_type.is_symlink() {
                match self.symlink_kind(&entry.path()).await {
                    Some(kind) => kind,
                    None => continue,
                }
            } else {
                Self::kind_of(&file_type)
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn read(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let full_path = self.resolve(path)?;
        fs::read(&full_path).await.map_err(|e| VfsError::from_io(e, path))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> VfsResult<()> {
        let full_path = self.resolve(path)?;
        if full_path.is_dir() {
            return Err(VfsError::invalid_path(format!(
                "is a folder: {}",
                path.display()
            )));
        }
        debug!(path = %full_path.display(), bytes = data.len(), "local write");
        fs::write(&full_path, data)
            .await
            .map_err(|e| VfsError::from_io(e, path))
    }

    async fn mkdir(&self, path: &Path) -> VfsResult<()> {
        let full_path = self.resolve(path)?;
        fs::create_dir(&full_path)
            .await
            .map_err(|e| VfsError::from_io(e, path))
    }

    async fn delete(&self, path: &Path) -> VfsResult<()> {
        let full_path = self.resolve(path)?;
        if full_path == self.root() {
            return Err(VfsError::invalid_path("cannot delete the workspace root"));
        }
        let meta = fs::symlink_metadata(&full_path)
            .await
            .map_err(|e| VfsError::from_io(e, path))?;
        debug!(path = %full_path.display(), "local delete");
        let result = if meta.is_dir() {
            fs::remove_dir_all(&full_path).await
        } else {
            fs::remove_file(&full_path).await
        };
        result.map_err(|e| VfsError::from_io(e, path))
    }

    async fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;

        if !from_path.exists() {
            return Err(VfsError::not_found(from.display().to_string()));
        }
        // fs::rename silently replaces files on unix; refuse instead.
        if to_path.exists() {
            return Err(VfsError::name_conflict(to.display().to_string()));
        }
        if to_path.starts_with(&from_path) {
            return Err(VfsError::invalid_path(format!(
                "cannot move {} into itself",
                from.display()
            )));
        }

        fs::rename(&from_path, &to_path)
            .await
            .map_err(|e| VfsError::from_io(e, to))
    }
}
