//! Workspace registry.
//!
//! Tracks every mounted workspace: identity, display name, mount path,
//! backend, connection state and classification. The first segment of any
//! tree path names its owning workspace, and [`WorkspaceRegistry::resolve`]
//! is the only way a path reaches a backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use canopy_types::{Classification, WorkspaceId, WorkspaceKind, WorkspaceRecord, WorkspaceStatus};
use tracing::{info, warn};

use crate::path_tree::{mount_of, normalize_path};
use crate::registry_db::RegistryDb;
use crate::vfs::{
    Backend, DirectoryHandle, LocalBackend, PermissionGrant, VfsError, VfsResult, VirtualStore,
};

/// A mounted workspace.
#[derive(Clone)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    pub kind: WorkspaceKind,
    /// `/slug`, unique across the registry, stable for the workspace's life.
    pub mount_path: String,
    pub status: WorkspaceStatus,
    pub classification: Classification,
    backend: Option<Arc<dyn Backend>>,
    handle: Option<DirectoryHandle>,
    /// System workspaces are host-provided and never written to the db.
    persistent: bool,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("mount_path", &self.mount_path)
            .field("status", &self.status)
            .field("classification", &self.classification)
            .field("has_backend", &self.backend.is_some())
            .finish()
    }
}

impl Workspace {
    fn new(
        name: String,
        kind: WorkspaceKind,
        mount_path: String,
        classification: Classification,
        backend: Option<Arc<dyn Backend>>,
    ) -> Self {
        Self {
            id: WorkspaceId::new(),
            name,
            kind,
            mount_path,
            status: WorkspaceStatus::Disconnected,
            classification,
            backend,
            handle: None,
            persistent: true,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    pub fn is_read_only(&self) -> bool {
        self.classification.is_read_only()
    }

    pub fn is_local(&self) -> bool {
        self.kind == WorkspaceKind::Local
    }

    /// The backend, if the workspace is connected.
    pub fn backend(&self) -> VfsResult<Arc<dyn Backend>> {
        match (&self.backend, self.status) {
            (Some(backend), WorkspaceStatus::Connected) => Ok(Arc::clone(backend)),
            _ => Err(VfsError::Disconnected(self.mount_path.clone())),
        }
    }

    /// The local directory handle, while one is held.
    pub fn handle(&self) -> Option<&DirectoryHandle> {
        self.handle.as_ref()
    }

    /// The persisted shape of this workspace.
    pub fn record(&self) -> WorkspaceRecord {
        WorkspaceRecord {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind,
            mount_path: self.mount_path.clone(),
            classification: self.classification,
        }
    }
}

/// Registry of mounted workspaces, in mount order.
pub struct WorkspaceRegistry {
    workspaces: Vec<Workspace>,
    store: Arc<VirtualStore>,
    db: Option<RegistryDb>,
    grant: Arc<dyn PermissionGrant>,
}

impl std::fmt::Debug for WorkspaceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceRegistry")
            .field("workspaces", &self.workspaces)
            .field("persistent", &self.db.is_some())
            .finish_non_exhaustive()
    }
}

impl WorkspaceRegistry {
    /// Create an empty, unpersisted registry.
    pub fn new(store: Arc<VirtualStore>, grant: Arc<dyn PermissionGrant>) -> Self {
        Self {
            workspaces: Vec::new(),
            store,
            db: None,
            grant,
        }
    }

    /// Persist registry records to `db`.
    pub fn with_db(mut self, db: RegistryDb) -> Self {
        self.db = Some(db);
        self
    }

    /// Restore persisted workspaces.
    ///
    /// Virtual workspaces come back connected. Local ones come back
    /// disconnected: directory handles do not survive a restart.
    pub fn load(&mut self) -> VfsResult<usize> {
        let Some(db) = &self.db else {
            return Ok(0);
        };
        let records = db.list()?;
        let mut loaded = 0;
        for record in records {
            if self.get(&record.mount_path).is_some() {
                warn!(mount = %record.mount_path, "skipping persisted workspace: mount taken");
                continue;
            }
            let (backend, status): (Option<Arc<dyn Backend>>, _) = match record.kind {
                WorkspaceKind::Virtual => (
                    Some(Arc::new(self.store.backend(record.id))),
                    WorkspaceStatus::Connected,
                ),
                WorkspaceKind::Local => (None, WorkspaceStatus::Disconnected),
            };
            self.workspaces.push(Workspace {
                id: record.id,
                name: record.name,
                kind: record.kind,
                mount_path: record.mount_path,
                status,
                classification: record.classification,
                backend,
                handle: None,
                persistent: true,
            });
            loaded += 1;
        }
        info!(loaded, "restored workspaces");
        Ok(loaded)
    }

    pub fn store(&self) -> &Arc<VirtualStore> {
        &self.store
    }

    pub fn workspaces(&self) -> &[Workspace] {
        &self.workspaces
    }

    /// Look up a workspace by mount path.
    pub fn get(&self, mount_path: &str) -> Option<&Workspace> {
        self.workspaces.iter().find(|w| w.mount_path == mount_path)
    }

    /// Stored bytes of every virtual workspace, in mount order.
    pub fn virtual_usage(&self) -> VfsResult<Vec<(WorkspaceRecord, u64)>> {
        self.workspaces
            .iter()
            .filter(|w| w.kind == WorkspaceKind::Virtual && w.persistent)
            .map(|w| Ok((w.record(), self.store.usage(w.id)?)))
            .collect()
    }

    fn index_of(&self, mount_path: &str) -> VfsResult<usize> {
        self.workspaces
            .iter()
            .position(|w| w.mount_path == mount_path)
            .ok_or_else(|| VfsError::not_found(mount_path.to_string()))
    }

    /// Find the owning workspace of `path` and the path relative to its root.
    ///
    /// Paths whose first segment is not a mount path are rejected.
    pub fn resolve(&self, path: &str) -> VfsResult<(&Workspace, PathBuf)> {
        let normalized = normalize_path(path);
        let mount = mount_of(&normalized).ok_or_else(|| VfsError::no_workspace(path.to_string()))?;
        let workspace = self
            .get(mount)
            .ok_or_else(|| VfsError::no_workspace(path.to_string()))?;
        let relative = normalized[mount.len()..].trim_start_matches('/');
        Ok((workspace, PathBuf::from(relative)))
    }

    /// Create a virtual workspace. It is connected immediately.
    ///
    /// The name is deduplicated ("Scratch", "Scratch (2)", ...) and the
    /// mount path is a deduplicated slug of it.
    pub fn add_virtual_workspace(&mut self, name: &str) -> VfsResult<Workspace> {
        let name = self.unique_name(clean_name(name)?);
        let mount_path = self.unique_mount(&name);
        let mut workspace = Workspace::new(
            name,
            WorkspaceKind::Virtual,
            mount_path,
            Classification::Normal,
            None,
        );
        workspace.backend = Some(Arc::new(self.store.backend(workspace.id)));
        workspace.status = WorkspaceStatus::Connected;
        self.insert(workspace)
    }

    /// Mount a user-granted local directory.
    ///
    /// Fails with `AlreadyMounted` if the same directory is registered. The
    /// workspace starts disconnected and becomes connected once an initial
    /// listing succeeds; a failed listing leaves it registered but
    /// disconnected.
    pub async fn add_local_workspace(
        &mut self,
        name: &str,
        handle: DirectoryHandle,
    ) -> VfsResult<Workspace> {
        self.check_not_mounted(&handle, None)?;
        let name = if name.trim().is_empty() {
            handle.dir_name()
        } else {
            clean_name(name)?
        };
        let name = self.unique_name(name);
        let mount_path = self.unique_mount(&name);

        let backend = Arc::new(LocalBackend::new(handle.clone()));
        let mut workspace = Workspace::new(
            name,
            WorkspaceKind::Local,
            mount_path,
            Classification::Normal,
            Some(backend.clone()),
        );
        workspace.handle = Some(handle);
        match backend.list(Path::new("")).await {
            Ok(_) => workspace.status = WorkspaceStatus::Connected,
            Err(e) => warn!(mount = %workspace.mount_path, error = %e, "initial listing failed"),
        }
        self.insert(workspace)
    }

    /// Mount host-provided content with a fixed classification.
    ///
    /// System workspaces are connected immediately and are not persisted;
    /// the host re-adds them on every start.
    pub fn add_system_workspace(
        &mut self,
        name: &str,
        mount_path: &str,
        classification: Classification,
        backend: Arc<dyn Backend>,
    ) -> VfsResult<Workspace> {
        let name = clean_name(name)?;
        let mount_path = normalize_path(mount_path);
        if mount_of(&mount_path) != Some(mount_path.as_str()) {
            return Err(VfsError::invalid_path(format!(
                "mount path must be one segment: {mount_path}"
            )));
        }
        if self.get(&mount_path).is_some() {
            return Err(VfsError::AlreadyMounted(mount_path));
        }
        let mut workspace =
            Workspace::new(name, backend.kind(), mount_path, classification, Some(backend));
        workspace.status = WorkspaceStatus::Connected;
        workspace.persistent = false;
        self.insert(workspace)
    }

    /// Re-request access and reconnect.
    ///
    /// Local workspaces with a surviving handle ask the grant to restore
    /// access; ones without a handle ask it to pick the directory again.
    /// On any failure the workspace stays disconnected and the error is
    /// returned.
    pub async fn reconnect_workspace(&mut self, mount_path: &str) -> VfsResult<Workspace> {
        let idx = self.index_of(mount_path)?;
        if self.workspaces[idx].is_connected() {
            return Ok(self.workspaces[idx].clone());
        }
        if !self.workspaces[idx].is_local() {
            if self.workspaces[idx].backend.is_none() {
                return Err(VfsError::Disconnected(mount_path.to_string()));
            }
            self.workspaces[idx].status = WorkspaceStatus::Connected;
            return Ok(self.workspaces[idx].clone());
        }

        let grant = Arc::clone(&self.grant);
        let handle = match self.workspaces[idx].handle.clone() {
            Some(handle) => {
                grant.request_permission(&handle).await?;
                handle
            }
            None => {
                let name = self.workspaces[idx].name.clone();
                let handle = grant.pick_directory(&name).await?;
                self.check_not_mounted(&handle, Some(idx))?;
                handle
            }
        };

        let backend = Arc::new(LocalBackend::new(handle.clone()));
        backend.list(Path::new("")).await?;

        let workspace = &mut self.workspaces[idx];
        workspace.handle = Some(handle);
        workspace.backend = Some(backend);
        workspace.status = WorkspaceStatus::Connected;
        info!(mount = %workspace.mount_path, "workspace reconnected");
        Ok(workspace.clone())
    }

    /// Mark a local workspace disconnected. Its files and registry entry
    /// are untouched.
    /// Returns false if the workspace was already disconnected.
    pub fn disconnect_workspace(&mut self, mount_path: &str) -> VfsResult<bool> {
        let idx = self.index_of(mount_path)?;
        if !self.workspaces[idx].is_local() {
            return Err(VfsError::invalid_path(format!(
                "only local workspaces can be disconnected: {mount_path}"
            )));
        }
        Ok(self.mark_disconnected(mount_path))
    }

    /// Flip a workspace to disconnected. Returns true if it was connected.
    pub fn mark_disconnected(&mut self, mount_path: &str) -> bool {
        match self.workspaces.iter_mut().find(|w| w.mount_path == mount_path) {
            Some(workspace) if workspace.is_connected() => {
                workspace.status = WorkspaceStatus::Disconnected;
                info!(mount = %mount_path, "workspace disconnected");
                true
            }
            _ => false,
        }
    }

    /// Unmount a workspace.
    ///
    /// Virtual content is destroyed. Local directories are never touched.
    /// The entry stays registered until both content and record are gone,
    /// so a failed removal can be retried.
    pub async fn remove_workspace(&mut self, mount_path: &str) -> VfsResult<Workspace> {
        let idx = self.index_of(mount_path)?;
        let workspace = &self.workspaces[idx];
        if workspace.kind == WorkspaceKind::Virtual && workspace.persistent {
            if let Some(backend) = &workspace.backend {
                backend.destroy().await?;
            }
        }
        if workspace.persistent {
            if let Some(db) = &self.db {
                db.delete(workspace.id)?;
            }
        }
        let workspace = self.workspaces.remove(idx);
        info!(mount = %workspace.mount_path, name = %workspace.name, "workspace removed");
        Ok(workspace)
    }

    /// Change a workspace's display name. The mount path is stable.
    pub fn rename_workspace(&mut self, mount_path: &str, name: &str) -> VfsResult<Workspace> {
        let idx = self.index_of(mount_path)?;
        let name = clean_name(name)?;
        if self
            .workspaces
            .iter()
            .enumerate()
            .any(|(i, w)| i != idx && w.name == name)
        {
            return Err(VfsError::name_conflict(name));
        }
        let workspace = &mut self.workspaces[idx];
        workspace.name = name;
        if workspace.persistent {
            if let Some(db) = &self.db {
                db.update_name(workspace.id, &workspace.name)?;
            }
        }
        Ok(workspace.clone())
    }

    fn insert(&mut self, workspace: Workspace) -> VfsResult<Workspace> {
        if workspace.persistent {
            if let Some(db) = &self.db {
                db.save(&workspace.record())?;
            }
        }
        info!(
            mount = %workspace.mount_path,
            name = %workspace.name,
            kind = %workspace.kind,
            status = %workspace.status,
            "workspace added"
        );
        self.workspaces.push(workspace.clone());
        Ok(workspace)
    }

    fn check_not_mounted(&self, handle: &DirectoryHandle, except: Option<usize>) -> VfsResult<()> {
        let taken = self.workspaces.iter().enumerate().find(|(i, w)| {
            Some(*i) != except
                && w.handle
                    .as_ref()
                    .is_some_and(|h| h.identity() == handle.identity())
        });
        match taken {
            Some((_, w)) => Err(VfsError::AlreadyMounted(format!(
                "{} is mounted at {}",
                handle.identity().display(),
                w.mount_path
            ))),
            None => Ok(()),
        }
    }

    fn unique_name(&self, base: String) -> String {
        if !self.workspaces.iter().any(|w| w.name == base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base} ({n})");
            if !self.workspaces.iter().any(|w| w.name == candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    fn unique_mount(&self, name: &str) -> String {
        let slug = slugify(name);
        let first = format!("/{slug}");
        if self.get(&first).is_none() {
            return first;
        }
        let mut n = 2;
        loop {
            let candidate = format!("/{slug}-{n}");
            if self.get(&candidate).is_none() {
                return candidate;
            }
            n += 1;
        }
    }
}

fn clean_name(name: &str) -> VfsResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(VfsError::invalid_path("workspace name is empty"));
    }
    Ok(name.to_string())
}

/// Lowercase ASCII alphanumerics; every other run becomes one `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "workspace".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::{DenyAll, StaticGrant};
    use tempfile::TempDir;

    fn registry_with(grant: impl PermissionGrant + 'static) -> WorkspaceRegistry {
        let store = Arc::new(VirtualStore::in_memory().unwrap());
        WorkspaceRegistry::new(store, Arc::new(grant))
    }

    fn registry() -> WorkspaceRegistry {
        registry_with(DenyAll)
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Scratch"), "scratch");
        assert_eq!(slugify("My  Cool Project!"), "my-cool-project");
        assert_eq!(slugify("Scratch (2)"), "scratch-2");
        assert_eq!(slugify("!!!"), "workspace");
    }

    #[test]
    fn test_add_virtual_dedupes_name_and_mount() {
        let mut reg = registry();
        let a = reg.add_virtual_workspace("Scratch").unwrap();
        let b = reg.add_virtual_workspace("Scratch").unwrap();
        let c = reg.add_virtual_workspace("Scratch").unwrap();

        assert_eq!(a.mount_path, "/scratch");
        assert!(a.is_connected());
        assert_eq!(b.name, "Scratch (2)");
        assert_eq!(b.mount_path, "/scratch-2");
        assert_eq!(c.name, "Scratch (3)");
        assert_eq!(c.mount_path, "/scratch-3");

        assert!(reg.add_virtual_workspace("   ").is_err());
    }

    #[test]
    fn test_resolve() {
        let mut reg = registry();
        reg.add_virtual_workspace("Scratch").unwrap();

        let (ws, rel) = reg.resolve("/scratch/src/main.lua").unwrap();
        assert_eq!(ws.mount_path, "/scratch");
        assert_eq!(rel, PathBuf::from("src/main.lua"));

        let (_, rel) = reg.resolve("/scratch").unwrap();
        assert_eq!(rel, PathBuf::from(""));

        assert!(matches!(reg.resolve("/nowhere/a"), Err(VfsError::NoWorkspace(_))));
        assert!(matches!(reg.resolve("/"), Err(VfsError::NoWorkspace(_))));
        assert!(matches!(reg.resolve("/scratchy"), Err(VfsError::NoWorkspace(_))));
    }

    #[tokio::test]
    async fn test_add_local_rejects_duplicate_directory() {
        let dir = TempDir::new().unwrap();
        let mut reg = registry();

        let ws = reg
            .add_local_workspace("proj", DirectoryHandle::open(dir.path()).unwrap())
            .await
            .unwrap();
        assert!(ws.is_connected());
        assert!(ws.is_local());

        let err = reg
            .add_local_workspace("again", DirectoryHandle::open(dir.path()).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::AlreadyMounted(_)));
        assert_eq!(reg.workspaces().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_and_reconnect_local() {
        let dir = TempDir::new().unwrap();
        let mut reg = registry_with(StaticGrant::new());
        let handle = DirectoryHandle::open(dir.path()).unwrap();
        reg.add_local_workspace("proj", handle.clone()).await.unwrap();

        reg.disconnect_workspace("/proj").unwrap();
        let ws = reg.get("/proj").unwrap();
        assert!(!ws.is_connected());
        assert!(matches!(ws.backend(), Err(VfsError::Disconnected(_))));

        handle.revoke();
        let ws = reg.reconnect_workspace("/proj").await.unwrap();
        assert!(ws.is_connected());
        assert!(handle.is_granted());
    }

    #[tokio::test]
    async fn test_reconnect_denied_stays_disconnected() {
        let dir = TempDir::new().unwrap();
        let mut reg = registry();
        let handle = DirectoryHandle::open(dir.path()).unwrap();
        reg.add_local_workspace("proj", handle.clone()).await.unwrap();

        handle.revoke();
        assert!(reg.mark_disconnected("/proj"));
        assert!(!reg.mark_disconnected("/proj"));

        let err = reg.reconnect_workspace("/proj").await.unwrap_err();
        assert!(err.is_permission_denied());
        assert!(!reg.get("/proj").unwrap().is_connected());
    }

    #[test]
    fn test_disconnect_virtual_is_rejected() {
        let mut reg = registry();
        reg.add_virtual_workspace("Scratch").unwrap();
        assert!(matches!(
            reg.disconnect_workspace("/scratch"),
            Err(VfsError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_virtual_destroys_content() {
        let mut reg = registry();
        let ws = reg.add_virtual_workspace("Scratch").unwrap();
        ws.backend()
            .unwrap()
            .write(Path::new("a.lua"), b"x")
            .await
            .unwrap();

        reg.remove_workspace("/scratch").await.unwrap();
        assert!(reg.get("/scratch").is_none());

        let orphan = reg.store().backend(ws.id);
        assert_eq!(orphan.stat(Path::new("a.lua")).await.unwrap(), None);
    }

    /// Virtual backend whose content cannot be discarded.
    struct Undestroyable;

    #[async_trait::async_trait]
    impl Backend for Undestroyable {
        fn kind(&self) -> WorkspaceKind {
            WorkspaceKind::Virtual
        }
        async fn stat(&self, _: &Path) -> VfsResult<Option<canopy_types::NodeKind>> {
            Ok(None)
        }
        async fn list(&self, _: &Path) -> VfsResult<Vec<crate::vfs::DirEntry>> {
            Ok(Vec::new())
        }
        async fn read(&self, path: &Path) -> VfsResult<Vec<u8>> {
            Err(VfsError::not_found(path.display().to_string()))
        }
        async fn write(&self, _: &Path, _: &[u8]) -> VfsResult<()> {
            Ok(())
        }
        async fn mkdir(&self, _: &Path) -> VfsResult<()> {
            Ok(())
        }
        async fn delete(&self, _: &Path) -> VfsResult<()> {
            Ok(())
        }
        async fn rename(&self, _: &Path, _: &Path) -> VfsResult<()> {
            Ok(())
        }
        async fn destroy(&self) -> VfsResult<()> {
            Err(VfsError::other("store is locked"))
        }
    }

    #[tokio::test]
    async fn test_virtual_usage() {
        let mut reg = registry();
        let ws = reg.add_virtual_workspace("Scratch").unwrap();
        reg.add_virtual_workspace("Empty").unwrap();
        ws.backend()
            .unwrap()
            .write(Path::new("a.lua"), b"hello")
            .await
            .unwrap();

        let usage = reg.virtual_usage().unwrap();
        let rows: Vec<_> = usage.iter().map(|(r, n)| (r.mount_path.as_str(), *n)).collect();
        assert_eq!(rows, vec![("/scratch", 5), ("/empty", 0)]);
    }

    #[tokio::test]
    async fn test_failed_remove_keeps_workspace() {
        let dir = TempDir::new().unwrap();
        let mut reg = registry().with_db(RegistryDb::open(dir.path().join("reg.db")).unwrap());
        let ws = reg.add_virtual_workspace("Scratch").unwrap();
        reg.workspaces[0].backend = Some(Arc::new(Undestroyable));

        assert!(reg.remove_workspace("/scratch").await.is_err());
        assert!(reg.get("/scratch").is_some());
        let saved = RegistryDb::open(dir.path().join("reg.db")).unwrap().list().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].id, ws.id);
    }

    #[tokio::test]
    async fn test_remove_local_leaves_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("keep.lua"), "x").unwrap();
        let mut reg = registry();
        reg.add_local_workspace("proj", DirectoryHandle::open(dir.path()).unwrap())
            .await
            .unwrap();

        reg.remove_workspace("/proj").await.unwrap();
        assert!(dir.path().join("keep.lua").exists());
    }

    #[test]
    fn test_rename_workspace_keeps_mount() {
        let mut reg = registry();
        reg.add_virtual_workspace("Scratch").unwrap();
        reg.add_virtual_workspace("Other").unwrap();

        let ws = reg.rename_workspace("/scratch", "Playground").unwrap();
        assert_eq!(ws.name, "Playground");
        assert_eq!(ws.mount_path, "/scratch");

        assert!(matches!(
            reg.rename_workspace("/scratch", "Other"),
            Err(VfsError::NameConflict(_))
        ));
    }

    #[test]
    fn test_system_workspace_classification() {
        let mut reg = registry();
        let backend = Arc::new(reg.store().backend(WorkspaceId::new()));
        let ws = reg
            .add_system_workspace("Library", "/lib", Classification::Library, backend.clone())
            .unwrap();
        assert!(ws.is_read_only());
        assert!(ws.is_connected());

        assert!(matches!(
            reg.add_system_workspace("Again", "/lib", Classification::Docs, backend.clone()),
            Err(VfsError::AlreadyMounted(_))
        ));
        assert!(reg
            .add_system_workspace("Nested", "/a/b", Classification::Docs, backend)
            .is_err());
    }

    #[tokio::test]
    async fn test_load_restores_records() {
        let dir = TempDir::new().unwrap();
        let local_dir = TempDir::new().unwrap();
        let store = Arc::new(VirtualStore::open(dir.path().join("store.db")).unwrap());
        let db_path = dir.path().join("registry.db");

        {
            let mut reg = WorkspaceRegistry::new(store.clone(), Arc::new(DenyAll))
                .with_db(RegistryDb::open(&db_path).unwrap());
            let ws = reg.add_virtual_workspace("Scratch").unwrap();
            ws.backend()
                .unwrap()
                .write(Path::new("a.lua"), b"kept")
                .await
                .unwrap();
            reg.add_local_workspace("proj", DirectoryHandle::open(local_dir.path()).unwrap())
                .await
                .unwrap();
            reg.rename_workspace("/scratch", "Renamed").unwrap();
        }

        let mut reg = WorkspaceRegistry::new(store, Arc::new(DenyAll))
            .with_db(RegistryDb::open(&db_path).unwrap());
        assert_eq!(reg.load().unwrap(), 2);

        let scratch = reg.get("/scratch").unwrap();
        assert_eq!(scratch.name, "Renamed");
        assert!(scratch.is_connected());
        assert_eq!(
            scratch.backend().unwrap().read(Path::new("a.lua")).await.unwrap(),
            b"kept"
        );

        let proj = reg.get("/proj").unwrap();
        assert!(!proj.is_connected());
        assert!(proj.handle().is_none());
    }
}
