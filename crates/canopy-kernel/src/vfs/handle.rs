//! Directory handles and the permission-grant collaborator.
//!
//! A [`DirectoryHandle`] is what the host hands over when the user grants
//! access to a directory. Access can be revoked at any time by the host
//! (all clones of a handle share the same access flag), after which every
//! backend call through it fails with `PermissionDenied`.
//!
//! Handles are never persisted. After a restart the registry asks a
//! [`PermissionGrant`] for a fresh one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::{VfsError, VfsResult};

/// Access to one user-granted directory.
#[derive(Debug, Clone)]
pub struct DirectoryHandle {
    root: PathBuf,
    granted: Arc<AtomicBool>,
}

impl DirectoryHandle {
    /// Open a handle on an existing directory.
    ///
    /// The root is canonicalized so two handles on the same directory
    /// compare equal via [`identity`](Self::identity).
    pub fn open(root: impl AsRef<Path>) -> VfsResult<Self> {
        let root = root.as_ref();
        let canonical = dunce::canonicalize(root).map_err(|e| VfsError::from_io(e, root))?;
        if !canonical.is_dir() {
            return Err(VfsError::invalid_path(format!(
                "not a directory: {}",
                canonical.display()
            )));
        }
        Ok(Self {
            root: canonical,
            granted: Arc::new(AtomicBool::new(true)),
        })
    }

    /// The canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Identity used for duplicate-mount detection.
    pub fn identity(&self) -> &Path {
        &self.root
    }

    /// Last path component, used as a default workspace name.
    pub fn dir_name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "local".to_string())
    }

    pub fn is_granted(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    /// Withdraw access (host-side revocation).
    pub fn revoke(&self) {
        self.granted.store(false, Ordering::SeqCst);
    }

    /// Restore access after the user re-grants it.
    pub fn grant(&self) {
        self.granted.store(true, Ordering::SeqCst);
    }

    /// Fail with `PermissionDenied` unless access is currently granted.
    pub fn check_access(&self) -> VfsResult<()> {
        if self.is_granted() {
            Ok(())
        } else {
            Err(VfsError::permission_denied(self.root.display().to_string()))
        }
    }
}

/// Host-side permission prompt for local directories.
#[async_trait]
pub trait PermissionGrant: Send + Sync {
    /// Re-request access to a directory already known to the registry.
    async fn request_permission(&self, handle: &DirectoryHandle) -> VfsResult<()>;

    /// Ask for the directory backing `workspace_name` when no handle
    /// survived (e.g. after a restart).
    async fn pick_directory(&self, workspace_name: &str) -> VfsResult<DirectoryHandle>;
}

/// Grant that always refuses.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

#[async_trait]
impl PermissionGrant for DenyAll {
    async fn request_permission(&self, handle: &DirectoryHandle) -> VfsResult<()> {
        Err(VfsError::permission_denied(handle.root().display().to_string()))
    }

    async fn pick_directory(&self, workspace_name: &str) -> VfsResult<DirectoryHandle> {
        Err(VfsError::permission_denied(workspace_name))
    }
}

/// Grant backed by a fixed name → directory table.
///
/// Known handles are always re-granted; lost handles are reopened from the
/// table. Hosts without an interactive picker (the CLI, tests) use this.
#[derive(Debug, Default, Clone)]
pub struct StaticGrant {
    roots: HashMap<String, PathBuf>,
}

impl StaticGrant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the directory for a workspace name.
    pub fn with_root(mut self, workspace_name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.roots.insert(workspace_name.into(), root.into());
        self
    }

    pub fn insert(&mut self, workspace_name: impl Into<String>, root: impl Into<PathBuf>) {
        self.roots.insert(workspace_name.into(), root.into());
    }
}

#[async_trait]
impl PermissionGrant for StaticGrant {
    async fn request_permission(&self, handle: &DirectoryHandle) -> VfsResult<()> {
        handle.grant();
        Ok(())
    }

    async fn pick_directory(&self, workspace_name: &str) -> VfsResult<DirectoryHandle> {
        match self.roots.get(workspace_name) {
            Some(root) => DirectoryHandle::open(root),
            None => Err(VfsError::permission_denied(workspace_name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_handle_identity_is_canonical() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let a = DirectoryHandle::open(dir.path().join("sub")).unwrap();
        let b = DirectoryHandle::open(dir.path().join("sub/../sub")).unwrap();
        assert_eq!(a.identity(), b.identity());
        assert_eq!(a.dir_name(), "sub");
    }

    #[test]
    fn test_open_rejects_missing_and_files() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            DirectoryHandle::open(dir.path().join("missing")),
            Err(VfsError::NotFound(_))
        ));

        std::fs::write(dir.path().join("file.txt"), "x").unwrap();
        assert!(matches!(
            DirectoryHandle::open(dir.path().join("file.txt")),
            Err(VfsError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_revoke_is_shared_across_clones() {
        let dir = TempDir::new().unwrap();
        let handle = DirectoryHandle::open(dir.path()).unwrap();
        let clone = handle.clone();

        handle.revoke();
        assert!(matches!(clone.check_access(), Err(VfsError::PermissionDenied(_))));

        clone.grant();
        assert!(handle.check_access().is_ok());
    }

    #[tokio::test]
    async fn test_static_grant() {
        let dir = TempDir::new().unwrap();
        let grant = StaticGrant::new().with_root("proj", dir.path());

        let handle = grant.pick_directory("proj").await.unwrap();
        handle.revoke();
        grant.request_permission(&handle).await.unwrap();
        assert!(handle.is_granted());

        assert!(grant.pick_directory("other").await.is_err());
        assert!(DenyAll.request_permission(&handle).await.is_err());
    }
}
