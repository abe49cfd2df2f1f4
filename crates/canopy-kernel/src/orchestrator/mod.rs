//! Operation orchestrator.
//!
//! The only component that calls backends for file operations. Every call
//! resolves its path through the registry first, rejects read-only targets
//! before any backend is touched, and maps backend failures onto
//! [`VfsError`]. A `PermissionDenied` from a local backend disconnects the
//! workspace and is reported with the operation that hit it.
//!
//! Destructive or surprising operations (delete, replace, cross-workspace
//! moves) come back as [`Outcome::NeedsConfirmation`]; nothing changes
//! until the caller hands the request back with [`Command::Confirm`].
//!
//! Completed mutations are published on the [`FlowBus`](crate::flows::FlowBus).

mod command;
mod upload;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use canopy_types::{Classification, FileContent, NodeKind, TreeNode, WorkspaceRecord};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::CanopyConfig;
use crate::flows::{FsFlow, SharedFlowBus, Subscription, shared_flow_bus};
use crate::path_tree::{
    PathTree, ROOT, is_same_or_under, join, mount_of, normalize_path, split_parent, validate_name,
};
use crate::projection;
use crate::registry::WorkspaceRegistry;
use crate::registry_db::RegistryDb;
use crate::vfs::{
    Backend, DirectoryHandle, LocalBackend, PermissionGrant, VfsError, VfsResult, VirtualStore,
};

pub use command::{Command, ConfirmationRequest, Outcome, Prompt, Variant};
pub use upload::{
    AlwaysConfirm, Confirmer, NeverConfirm, UploadError, UploadFile, UploadReport, UploadSource,
};

use command::PendingAction;

/// A path resolved to its workspace and backend.
struct Target {
    /// Normalized absolute path.
    path: String,
    mount: String,
    /// Path relative to the workspace root; empty for the root itself.
    relative: PathBuf,
    backend: Arc<dyn Backend>,
}

impl Target {
    fn is_root(&self) -> bool {
        self.relative.as_os_str().is_empty()
    }

    fn name(&self) -> &str {
        split_parent(&self.path).map(|(_, name)| name).unwrap_or("")
    }

    fn parent_relative(&self) -> PathBuf {
        self.relative
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

/// Validated inputs of a move or copy.
struct Transfer {
    source: Target,
    folder: Target,
    dest_path: String,
    dest_relative: PathBuf,
    dest_exists: bool,
}

/// Enforces conflict, cross-workspace and read-only policy around backend
/// calls.
pub struct Orchestrator {
    registry: WorkspaceRegistry,
    tree: PathTree,
    bus: SharedFlowBus,
    /// Placeholders awaiting their rename prompt.
    pending: HashSet<String>,
    placeholder_file: String,
    placeholder_folder: String,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("nodes", &self.tree.len())
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(registry: WorkspaceRegistry, bus: SharedFlowBus) -> Self {
        let mut tree = PathTree::new();
        for workspace in registry.workspaces() {
            if let Err(e) = tree.insert(&workspace.mount_path, NodeKind::Folder) {
                warn!(mount = %workspace.mount_path, error = %e, "cannot index workspace root");
            }
        }
        Self {
            registry,
            tree,
            bus,
            pending: HashSet::new(),
            placeholder_file: "untitled.lua".to_string(),
            placeholder_folder: "untitled".to_string(),
        }
    }

    /// Set the names given to freshly created files and folders.
    pub fn with_placeholders(mut self, file: &str, folder: &str) -> Self {
        self.placeholder_file = file.to_string();
        self.placeholder_folder = folder.to_string();
        self
    }

    /// Open persisted state under the configured data directory, mount the
    /// configured system directories and restore saved workspaces.
    ///
    /// Call [`refresh`](Self::refresh) afterwards to list backends.
    pub fn from_config(config: &CanopyConfig, grant: Arc<dyn PermissionGrant>) -> VfsResult<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| VfsError::from_io(e, &config.data_dir))?;
        let store = Arc::new(
            VirtualStore::open(config.store_path())?.with_quota(config.virtual_quota_bytes),
        );
        let db = RegistryDb::open(config.registry_path())?;
        let mut registry = WorkspaceRegistry::new(store, grant).with_db(db);

        for mount in &config.system {
            let handle = match DirectoryHandle::open(&mount.path) {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(mount = %mount.mount, path = %mount.path.display(), error = %e, "system mount unavailable");
                    continue;
                }
            };
            let backend = Arc::new(LocalBackend::new(handle));
            if let Err(e) =
                registry.add_system_workspace(&mount.name, &mount.mount, mount.classification, backend)
            {
                warn!(mount = %mount.mount, error = %e, "system mount rejected");
            }
        }
        registry.load()?;

        Ok(Self::new(registry, shared_flow_bus(config.event_capacity))
            .with_placeholders(&config.placeholder_file_name, &config.placeholder_folder_name))
    }

    pub fn registry(&self) -> &WorkspaceRegistry {
        &self.registry
    }

    pub fn tree(&self) -> &PathTree {
        &self.tree
    }

    pub fn bus(&self) -> &SharedFlowBus {
        &self.bus
    }

    pub fn subscribe(&self, pattern: &str) -> Subscription<FsFlow> {
        self.bus.subscribe(pattern)
    }

    /// True while `path` is a placeholder awaiting its rename prompt.
    pub fn is_pending(&self, path: &str) -> bool {
        self.pending.contains(path)
    }

    // ========================================================================
    // Single entry point
    // ========================================================================

    /// Run one command.
    pub async fn execute(&mut self, command: Command) -> VfsResult<Outcome> {
        debug!(command = command.as_ref(), "execute");
        match command {
            Command::CreateFile { parent } => {
                let path = self.create_file(&parent).await?;
                Ok(Outcome::Created { path, kind: NodeKind::File })
            }
            Command::CreateFolder { parent } => {
                let path = self.create_folder(&parent).await?;
                Ok(Outcome::Created { path, kind: NodeKind::Folder })
            }
            Command::CommitCreation { path, name } => {
                let to = self.commit_creation(&path, &name).await?;
                Ok(Outcome::Renamed { from: path, to })
            }
            Command::CancelCreation { path } => {
                self.cancel_creation(&path).await?;
                Ok(Outcome::CreationCancelled { path })
            }
            Command::Rename { path, name } => self.rename(&path, &name).await,
            Command::RequestDelete { path } => {
                Ok(Outcome::NeedsConfirmation(self.request_delete(&path).await?))
            }
            Command::Move { source, target_folder } => self.move_node(&source, &target_folder).await,
            Command::Copy { source, target_folder } => self.copy_node(&source, &target_folder).await,
            Command::WriteFile { path, content } => {
                let bytes = self.write_file(&path, &content).await?;
                Ok(Outcome::Written { path, bytes })
            }
            Command::ReadFile { path } => {
                let content = self.read_file(&path).await?;
                Ok(Outcome::Content { path, content })
            }
            Command::UploadBatch { files, target_folder, confirm } => {
                let report = self.upload_batch(files, &target_folder, confirm.as_ref()).await?;
                Ok(Outcome::Uploaded(report))
            }
            Command::UploadFolderBatch { files, target_folder, confirm, cancel } => {
                let report = self
                    .upload_folder_batch(files, &target_folder, confirm.as_ref(), &cancel)
                    .await?;
                Ok(Outcome::Uploaded(report))
            }
            Command::CloneProject { path, name } => {
                Ok(Outcome::Workspace(self.clone_project(&path, name.as_deref()).await?))
            }
            Command::AddVirtualWorkspace { name } => {
                Ok(Outcome::Workspace(self.add_virtual_workspace(&name)?))
            }
            Command::AddLocalWorkspace { name, handle } => {
                Ok(Outcome::Workspace(self.add_local_workspace(&name, handle).await?))
            }
            Command::ReconnectWorkspace { mount_path } => {
                Ok(Outcome::Workspace(self.reconnect_workspace(&mount_path).await?))
            }
            Command::DisconnectWorkspace { mount_path } => {
                self.disconnect_workspace(&mount_path)?;
                Ok(Outcome::WorkspaceDisconnected { mount_path })
            }
            Command::RemoveWorkspace { mount_path } => {
                self.remove_workspace(&mount_path).await?;
                Ok(Outcome::WorkspaceRemoved { mount_path })
            }
            Command::ResolveLocation { path } => {
                Ok(Outcome::Location(self.resolve_location(&path).await?))
            }
            Command::Refresh => Ok(Outcome::Tree(self.refresh().await)),
            Command::Confirm(request) => self.confirm(request).await,
        }
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Create a placeholder file in `parent` and return its path.
    ///
    /// The caller is expected to follow up with
    /// [`commit_creation`](Self::commit_creation) or
    /// [`cancel_creation`](Self::cancel_creation).
    pub async fn create_file(&mut self, parent: &str) -> VfsResult<String> {
        self.create(parent, NodeKind::File).await
    }

    /// Create a placeholder folder in `parent` and return its path.
    pub async fn create_folder(&mut self, parent: &str) -> VfsResult<String> {
        self.create(parent, NodeKind::Folder).await
    }

    async fn create(&mut self, parent: &str, kind: NodeKind) -> VfsResult<String> {
        let operation = if kind.is_file() { "create_file" } else { "create_folder" };
        let folder = self.writable(parent)?;
        self.require_folder(&folder, operation).await?;

        let base = match kind {
            NodeKind::File => self.placeholder_file.clone(),
            NodeKind::Folder => self.placeholder_folder.clone(),
        };
        let name = free_name(folder.backend.as_ref(), &folder.relative, &base).await;
        let name = self.guard(&folder.mount, operation, name)?;

        let relative = folder.relative.join(&name);
        let result = match kind {
            NodeKind::File => folder.backend.write(&relative, b"").await,
            NodeKind::Folder => folder.backend.mkdir(&relative).await,
        };
        self.guard(&folder.mount, operation, result)?;

        let path = join(&folder.path, &name);
        self.track_insert(&path, kind).await;
        self.pending.insert(path.clone());
        info!(path = %path, ?kind, "placeholder created");
        self.emit(FsFlow::Created { path: path.clone(), kind });
        Ok(path)
    }

    /// Give a pending placeholder its final name.
    pub async fn commit_creation(&mut self, path: &str, name: &str) -> VfsResult<String> {
        let path = normalize_path(path);
        if !self.pending.remove(&path) {
            return Err(VfsError::not_found(format!("no pending creation at {path}")));
        }
        match self.rename_node(&path, name).await {
            Ok(new_path) => Ok(new_path),
            Err(e) => {
                // Still awaiting a name; the caller may retry or cancel.
                self.pending.insert(path);
                Err(e)
            }
        }
    }

    /// Abandon a pending creation, deleting its placeholder.
    pub async fn cancel_creation(&mut self, path: &str) -> VfsResult<()> {
        let path = normalize_path(path);
        if !self.pending.remove(&path) {
            return Err(VfsError::not_found(format!("no pending creation at {path}")));
        }
        if let Err(e) = self.discard_placeholder(&path).await {
            self.pending.insert(path);
            return Err(e);
        }
        Ok(())
    }

    async fn discard_placeholder(&mut self, path: &str) -> VfsResult<()> {
        let target = self.writable(path)?;
        let result = target.backend.delete(&target.relative).await;
        match self.guard(&target.mount, "cancel_creation", result) {
            Ok(()) | Err(VfsError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.tree.remove(&target.path);
        debug!(path = %target.path, "placeholder discarded");
        self.emit(FsFlow::Deleted { path: target.path });
        Ok(())
    }

    // ========================================================================
    // Rename / delete
    // ========================================================================

    /// Rename a node, or a workspace if `path` is a mount path.
    ///
    /// Workspace renames only change the display name.
    pub async fn rename(&mut self, path: &str, name: &str) -> VfsResult<Outcome> {
        let path = normalize_path(path);
        if mount_of(&path) == Some(path.as_str()) {
            let workspace = self
                .registry
                .get(&path)
                .ok_or_else(|| VfsError::no_workspace(path.clone()))?;
            if workspace.is_read_only() {
                return Err(VfsError::ReadOnly(path));
            }
            let workspace = self.registry.rename_workspace(&path, name)?;
            self.emit(FsFlow::WorkspaceRenamed {
                mount_path: workspace.mount_path.clone(),
                name: workspace.name.clone(),
            });
            return Ok(Outcome::Workspace(workspace.record()));
        }

        let to = self.rename_node(&path, name).await?;
        Ok(Outcome::Renamed { from: path, to })
    }

    async fn rename_node(&mut self, path: &str, name: &str) -> VfsResult<String> {
        validate_name(name)?;
        let target = self.writable(path)?;
        if target.is_root() {
            return Err(VfsError::invalid_path("use the workspace rename for roots"));
        }
        let old_name = target.name().to_string();
        if old_name == name {
            return Ok(target.path);
        }

        // Sibling names compare case-sensitively, even on backends that
        // do not.
        let parent_relative = target.parent_relative();
        let listing = target.backend.list(&parent_relative).await;
        let siblings = self.guard(&target.mount, "rename", listing)?;
        if !siblings.iter().any(|e| e.name == old_name) {
            return Err(VfsError::not_found(target.path));
        }
        let (parent, _) = split_parent(&target.path)
            .ok_or_else(|| VfsError::invalid_path(target.path.clone()))?;
        let new_path = join(parent, name);
        if siblings.iter().any(|e| e.name == name) {
            return Err(VfsError::name_conflict(new_path));
        }

        let new_relative = parent_relative.join(name);
        let result = target.backend.rename(&target.relative, &new_relative).await;
        self.guard(&target.mount, "rename", result)?;

        if let Err(e) = self.tree.rename(&target.path, name) {
            debug!(path = %target.path, error = %e, "tree out of date, resyncing");
            self.resync(&target.mount).await;
        }
        self.repoint_pending(&target.path, &new_path);
        info!(from = %target.path, to = %new_path, "renamed");
        self.emit(FsFlow::Renamed {
            from: target.path.clone(),
            to: new_path.clone(),
        });
        Ok(new_path)
    }

    /// Ask before deleting `path` (recursively, for folders).
    pub async fn request_delete(&mut self, path: &str) -> VfsResult<ConfirmationRequest> {
        let target = self.writable(path)?;
        if target.is_root() {
            return Err(VfsError::invalid_path(format!(
                "{} is a workspace root; remove the workspace instead",
                target.path
            )));
        }
        let kind = self.stat(&target, "delete").await?;
        let name = target.name();
        let prompt = match kind {
            NodeKind::File => Prompt::new(
                "Delete File",
                format!("Delete \"{name}\"? This cannot be undone."),
                Variant::Danger,
                "Delete",
            ),
            NodeKind::Folder => Prompt::new(
                "Delete Folder",
                format!("Delete \"{name}\" and everything in it? This cannot be undone."),
                Variant::Danger,
                "Delete",
            ),
        };
        Ok(ConfirmationRequest::new(
            prompt,
            PendingAction::Delete { path: target.path },
        ))
    }

    async fn delete_node(&mut self, path: &str) -> VfsResult<String> {
        let target = self.writable(path)?;
        if target.is_root() {
            return Err(VfsError::invalid_path(format!(
                "{} is a workspace root",
                target.path
            )));
        }
        let result = target.backend.delete(&target.relative).await;
        self.guard(&target.mount, "delete", result)?;

        self.tree.remove(&target.path);
        self.pending.retain(|p| !is_same_or_under(p, &target.path));
        info!(path = %target.path, "deleted");
        self.emit(FsFlow::Deleted {
            path: target.path.clone(),
        });
        Ok(target.path)
    }

    // ========================================================================
    // Move / copy
    // ========================================================================

    /// Move `source` into `target_folder`.
    ///
    /// Within one workspace this is a backend rename, preceded by a Replace
    /// confirmation if the destination exists. Between workspaces it is
    /// never a move: a "Copy Between Workspaces" confirmation is returned
    /// and, once confirmed, the source is copied and left in place.
    pub async fn move_node(&mut self, source: &str, target_folder: &str) -> VfsResult<Outcome> {
        let source_path = normalize_path(source);
        let folder_path = normalize_path(target_folder);
        let (source_ws, _) = self.registry.resolve(&source_path)?;
        let (folder_ws, _) = self.registry.resolve(&folder_path)?;

        if source_ws.mount_path != folder_ws.mount_path {
            let source_mount = source_ws.mount_path.clone();
            let plan = self.plan_copy(&source_path, &folder_path).await?;
            let name = plan.source.name();
            let mut message = format!(
                "Moving between workspaces copies \"{name}\" to {}. The original stays in {source_mount}.",
                plan.folder.path
            );
            if plan.dest_exists {
                message.push_str(&format!(" The existing \"{name}\" there will be replaced."));
            }
            return Ok(Outcome::NeedsConfirmation(ConfirmationRequest::new(
                Prompt::new("Copy Between Workspaces", message, Variant::Default, "Copy"),
                PendingAction::Copy {
                    source: plan.source.path,
                    target_folder: plan.folder.path,
                },
            )));
        }

        let plan = self.plan_move(&source_path, &folder_path).await?;
        if plan.dest_path == plan.source.path {
            return Ok(Outcome::Moved {
                from: plan.source.path.clone(),
                to: plan.dest_path,
            });
        }
        if plan.dest_exists {
            let name = plan.source.name();
            return Ok(Outcome::NeedsConfirmation(ConfirmationRequest::new(
                Prompt::new(
                    "Replace",
                    format!("\"{name}\" already exists in {}. Replace it?", plan.folder.path),
                    Variant::Danger,
                    "Replace",
                ),
                PendingAction::ReplaceMove {
                    source: plan.source.path,
                    target_folder: plan.folder.path,
                },
            )));
        }
        self.finish_move(plan).await
    }

    async fn plan_move(&mut self, source: &str, target_folder: &str) -> VfsResult<Transfer> {
        let source = self.writable(source)?;
        let folder = self.writable(target_folder)?;
        if source.mount != folder.mount {
            return Err(VfsError::invalid_path(format!(
                "{} and {} are in different workspaces",
                source.path, folder.path
            )));
        }
        if source.is_root() {
            return Err(VfsError::invalid_path("workspace roots cannot be moved"));
        }
        if is_same_or_under(&folder.path, &source.path) {
            return Err(VfsError::invalid_path(format!(
                "cannot move {} into itself",
                source.path
            )));
        }
        self.stat(&source, "move").await?;
        self.require_folder(&folder, "move").await?;

        let dest_path = join(&folder.path, source.name());
        if is_same_or_under(&source.path, &dest_path) {
            // The destination is the source or one of its ancestors;
            // replacing it would delete the source.
            return Err(VfsError::name_conflict(dest_path));
        }
        let dest_relative = folder.relative.join(source.name());
        let exists = folder.backend.stat(&dest_relative).await;
        let dest_exists = self.guard(&folder.mount, "move", exists)?.is_some();
        Ok(Transfer {
            source,
            folder,
            dest_path,
            dest_relative,
            dest_exists,
        })
    }

    async fn finish_move(&mut self, plan: Transfer) -> VfsResult<Outcome> {
        let Transfer {
            source,
            folder,
            dest_path,
            dest_relative,
            ..
        } = plan;
        let result = source.backend.rename(&source.relative, &dest_relative).await;
        self.guard(&source.mount, "move", result)?;

        if let Err(e) = self.tree.move_to(&source.path, &folder.path) {
            debug!(path = %source.path, error = %e, "tree out of date, resyncing");
            self.resync(&source.mount).await;
        }
        self.repoint_pending(&source.path, &dest_path);
        info!(from = %source.path, to = %dest_path, "moved");
        self.emit(FsFlow::Moved {
            from: source.path.clone(),
            to: dest_path.clone(),
        });
        Ok(Outcome::Moved {
            from: source.path,
            to: dest_path,
        })
    }

    /// Copy `source` into `target_folder`, across workspaces if need be.
    ///
    /// A name conflict returns a "Replace with Copy" confirmation.
    pub async fn copy_node(&mut self, source: &str, target_folder: &str) -> VfsResult<Outcome> {
        let plan = self.plan_copy(source, target_folder).await?;
        if plan.dest_exists {
            let name = plan.source.name();
            return Ok(Outcome::NeedsConfirmation(ConfirmationRequest::new(
                Prompt::new(
                    "Replace with Copy",
                    format!(
                        "\"{name}\" already exists in {}. Replace it with a copy?",
                        plan.folder.path
                    ),
                    Variant::Danger,
                    "Replace",
                ),
                PendingAction::Copy {
                    source: plan.source.path,
                    target_folder: plan.folder.path,
                },
            )));
        }
        self.finish_copy(plan).await
    }

    async fn plan_copy(&mut self, source: &str, target_folder: &str) -> VfsResult<Transfer> {
        // Copying out of a read-only workspace is fine; only the
        // destination must be writable.
        let folder = self.writable(target_folder)?;
        let source = self.readable(source)?;
        if source.is_root() {
            return Err(VfsError::invalid_path("workspace roots cannot be copied"));
        }
        if is_same_or_under(&folder.path, &source.path) {
            return Err(VfsError::invalid_path(format!(
                "cannot copy {} into itself",
                source.path
            )));
        }
        self.stat(&source, "copy").await?;
        self.require_folder(&folder, "copy").await?;

        let dest_path = join(&folder.path, source.name());
        if is_same_or_under(&source.path, &dest_path) {
            return Err(VfsError::name_conflict(dest_path));
        }
        let dest_relative = folder.relative.join(source.name());
        let exists = folder.backend.stat(&dest_relative).await;
        let dest_exists = self.guard(&folder.mount, "copy", exists)?.is_some();
        Ok(Transfer {
            source,
            folder,
            dest_path,
            dest_relative,
            dest_exists,
        })
    }

    async fn finish_copy(&mut self, plan: Transfer) -> VfsResult<Outcome> {
        if plan.dest_exists {
            let result = plan.folder.backend.delete(&plan.dest_relative).await;
            self.guard(&plan.folder.mount, "copy", result)?;
            self.tree.remove(&plan.dest_path);
        }
        self.copy_tree(&plan.source, &plan.folder, &plan.dest_relative)
            .await?;

        self.resync(&plan.folder.mount).await;
        info!(from = %plan.source.path, to = %plan.dest_path, "copied");
        self.emit(FsFlow::Copied {
            from: plan.source.path.clone(),
            to: plan.dest_path.clone(),
        });
        Ok(Outcome::Copied {
            from: plan.source.path,
            to: plan.dest_path,
        })
    }

    /// Copy the node at `source` to `dest_relative` inside `dest`'s workspace.
    async fn copy_tree(
        &mut self,
        source: &Target,
        dest: &Target,
        dest_relative: &Path,
    ) -> VfsResult<()> {
        match self.stat(source, "copy").await? {
            NodeKind::File => {
                let data = source.backend.read(&source.relative).await;
                let data = self.guard(&source.mount, "copy", data)?;
                let result = dest.backend.write(dest_relative, &data).await;
                self.guard(&dest.mount, "copy", result)
            }
            NodeKind::Folder => {
                let result = dest.backend.mkdir(dest_relative).await;
                self.guard(&dest.mount, "copy", result)?;
                self.copy_contents(source, dest, dest_relative).await
            }
        }
    }

    /// Copy everything below the folder at `source` into `dest_relative`.
    async fn copy_contents(
        &mut self,
        source: &Target,
        dest: &Target,
        dest_relative: &Path,
    ) -> VfsResult<()> {
        let listing = source.backend.list_recursive(&source.relative).await;
        let entries = self.guard(&source.mount, "copy", listing)?;
        for (path, kind) in entries {
            let suffix = path.strip_prefix(&source.relative).unwrap_or(&path);
            let to = dest_relative.join(suffix);
            match kind {
                NodeKind::Folder => {
                    let result = dest.backend.mkdir(&to).await;
                    self.guard(&dest.mount, "copy", result)?;
                }
                NodeKind::File => {
                    let data = source.backend.read(&path).await;
                    let data = self.guard(&source.mount, "copy", data)?;
                    let result = dest.backend.write(&to, &data).await;
                    self.guard(&dest.mount, "copy", result)?;
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Confirmation
    // ========================================================================

    /// Run the action a confirmation request was holding.
    ///
    /// The request is re-validated: anything that changed since it was
    /// issued surfaces as an ordinary error.
    pub async fn confirm(&mut self, request: ConfirmationRequest) -> VfsResult<Outcome> {
        debug!(title = request.title(), "confirmed");
        match request.action {
            PendingAction::Delete { path } => {
                let path = self.delete_node(&path).await?;
                Ok(Outcome::Deleted { path })
            }
            PendingAction::ReplaceMove {
                source,
                target_folder,
            } => {
                let mut plan = self.plan_move(&source, &target_folder).await?;
                if plan.dest_exists {
                    let result = plan.folder.backend.delete(&plan.dest_relative).await;
                    self.guard(&plan.folder.mount, "move", result)?;
                    self.tree.remove(&plan.dest_path);
                    plan.dest_exists = false;
                }
                self.finish_move(plan).await
            }
            PendingAction::Copy {
                source,
                target_folder,
            } => {
                let plan = self.plan_copy(&source, &target_folder).await?;
                self.finish_copy(plan).await
            }
        }
    }

    // ========================================================================
    // File content
    // ========================================================================

    /// Create or replace a file's content. Returns the byte count.
    pub async fn write_file(&mut self, path: &str, content: &[u8]) -> VfsResult<usize> {
        let target = self.writable(path)?;
        if target.is_root() {
            return Err(VfsError::invalid_path("cannot write a workspace root"));
        }
        let result = target.backend.write(&target.relative, content).await;
        self.guard(&target.mount, "write_file", result)?;

        self.track_insert(&target.path, NodeKind::File).await;
        debug!(path = %target.path, bytes = content.len(), "written");
        self.emit(FsFlow::Written {
            path: target.path,
            bytes: content.len(),
        });
        Ok(content.len())
    }

    /// Read a file, classified as text or binary by extension.
    pub async fn read_file(&mut self, path: &str) -> VfsResult<FileContent> {
        let target = self.readable(path)?;
        let data = target.backend.read(&target.relative).await;
        let data = self.guard(&target.mount, "read_file", data)?;
        Ok(FileContent::from_bytes(&target.path, data))
    }

    // ========================================================================
    // Projects
    // ========================================================================

    /// Copy an immediate subfolder of a projects workspace into a new
    /// virtual workspace.
    pub async fn clone_project(
        &mut self,
        path: &str,
        name: Option<&str>,
    ) -> VfsResult<WorkspaceRecord> {
        let path = normalize_path(path);
        let (workspace, relative) = self.registry.resolve(&path)?;
        if !workspace.classification.allows_clone() {
            return Err(VfsError::invalid_path(format!(
                "{} is not a projects workspace",
                workspace.mount_path
            )));
        }
        if relative.components().count() != 1 {
            return Err(VfsError::invalid_path(format!(
                "only immediate subfolders of {} can be cloned",
                workspace.mount_path
            )));
        }

        let source = self.readable(&path)?;
        if self.stat(&source, "clone_project").await? != NodeKind::Folder {
            return Err(VfsError::invalid_path(format!("not a folder: {path}")));
        }
        let name = name.unwrap_or(source.name()).to_string();
        let workspace = self.registry.add_virtual_workspace(&name)?;
        let dest = Target {
            path: workspace.mount_path.clone(),
            mount: workspace.mount_path.clone(),
            relative: PathBuf::new(),
            backend: workspace.backend()?,
        };

        if let Err(e) = self.copy_contents(&source, &dest, Path::new("")).await {
            warn!(source = %path, error = %e, "clone failed, discarding workspace");
            if let Err(cleanup) = self.registry.remove_workspace(&workspace.mount_path).await {
                warn!(mount = %workspace.mount_path, error = %cleanup, "cleanup failed");
            }
            return Err(e);
        }

        self.resync(&workspace.mount_path).await;
        info!(source = %path, mount = %workspace.mount_path, "project cloned");
        self.emit(FsFlow::WorkspaceAdded {
            mount_path: workspace.mount_path.clone(),
            name: workspace.name.clone(),
        });
        Ok(workspace.record())
    }

    // ========================================================================
    // Workspaces
    // ========================================================================

    pub fn add_virtual_workspace(&mut self, name: &str) -> VfsResult<WorkspaceRecord> {
        let workspace = self.registry.add_virtual_workspace(name)?;
        self.index_root(&workspace.mount_path);
        self.emit(FsFlow::WorkspaceAdded {
            mount_path: workspace.mount_path.clone(),
            name: workspace.name.clone(),
        });
        Ok(workspace.record())
    }

    pub async fn add_local_workspace(
        &mut self,
        name: &str,
        handle: DirectoryHandle,
    ) -> VfsResult<WorkspaceRecord> {
        let workspace = self.registry.add_local_workspace(name, handle).await?;
        self.index_root(&workspace.mount_path);
        self.resync(&workspace.mount_path).await;
        self.emit(FsFlow::WorkspaceAdded {
            mount_path: workspace.mount_path.clone(),
            name: workspace.name.clone(),
        });
        if workspace.is_connected() {
            self.emit(FsFlow::WorkspaceConnected {
                mount_path: workspace.mount_path.clone(),
            });
        }
        Ok(workspace.record())
    }

    /// Mount host-provided content with a fixed classification.
    pub fn add_system_workspace(
        &mut self,
        name: &str,
        mount_path: &str,
        classification: Classification,
        backend: Arc<dyn Backend>,
    ) -> VfsResult<WorkspaceRecord> {
        let workspace =
            self.registry
                .add_system_workspace(name, mount_path, classification, backend)?;
        self.index_root(&workspace.mount_path);
        self.emit(FsFlow::WorkspaceAdded {
            mount_path: workspace.mount_path.clone(),
            name: workspace.name.clone(),
        });
        Ok(workspace.record())
    }

    pub async fn reconnect_workspace(&mut self, mount_path: &str) -> VfsResult<WorkspaceRecord> {
        let mount_path = normalize_path(mount_path);
        let workspace = self.registry.reconnect_workspace(&mount_path).await?;
        self.resync(&mount_path).await;
        self.emit(FsFlow::WorkspaceConnected {
            mount_path: mount_path.clone(),
        });
        Ok(workspace.record())
    }

    pub fn disconnect_workspace(&mut self, mount_path: &str) -> VfsResult<()> {
        let mount_path = normalize_path(mount_path);
        if self.registry.disconnect_workspace(&mount_path)? {
            self.emit(FsFlow::WorkspaceDisconnected {
                mount_path,
                operation: None,
            });
        }
        Ok(())
    }

    pub async fn remove_workspace(&mut self, mount_path: &str) -> VfsResult<WorkspaceRecord> {
        let mount_path = normalize_path(mount_path);
        let workspace = self.registry.remove_workspace(&mount_path).await?;
        self.tree.remove(&mount_path);
        self.pending.retain(|p| !is_same_or_under(p, &mount_path));
        self.emit(FsFlow::WorkspaceRemoved {
            mount_path: mount_path.clone(),
        });
        Ok(workspace.record())
    }

    // ========================================================================
    // Shell / projection
    // ========================================================================

    /// Resolve a path for the shell's `cd`: `.` and `..` are normalized and
    /// a file resolves to its parent folder.
    pub async fn resolve_location(&mut self, path: &str) -> VfsResult<String> {
        let path = normalize_path(path);
        if path == ROOT {
            return Ok(path);
        }
        let (workspace, relative) = self.registry.resolve(&path)?;
        if relative.as_os_str().is_empty() {
            return Ok(path);
        }

        let cached = self.tree.find(&path).map(|node| node.kind);
        let kind = match cached {
            Some(kind) => Some(kind),
            None if workspace.is_connected() => {
                let mount = workspace.mount_path.clone();
                let backend = workspace.backend()?;
                let stat = backend.stat(&relative).await;
                self.guard(&mount, "resolve_location", stat)?
            }
            None => None,
        };
        match kind {
            Some(NodeKind::Folder) => Ok(path),
            Some(NodeKind::File) => Ok(split_parent(&path)
                .map(|(parent, _)| parent.to_string())
                .unwrap_or_else(|| ROOT.to_string())),
            None => Err(VfsError::not_found(path)),
        }
    }

    /// Re-list every workspace and return the renderable tree.
    pub async fn refresh(&mut self) -> Vec<TreeNode> {
        let disconnected = projection::rebuild(&mut self.registry, &mut self.tree).await;
        for mount_path in disconnected {
            self.emit(FsFlow::WorkspaceDisconnected {
                mount_path,
                operation: Some("refresh".to_string()),
            });
        }
        self.snapshot()
    }

    /// The renderable tree as last read.
    pub fn snapshot(&self) -> Vec<TreeNode> {
        projection::project(&self.registry, &self.tree)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Resolve a path for reading.
    fn readable(&self, path: &str) -> VfsResult<Target> {
        let path = normalize_path(path);
        let (workspace, relative) = self.registry.resolve(&path)?;
        Ok(Target {
            mount: workspace.mount_path.clone(),
            backend: workspace.backend()?,
            relative,
            path,
        })
    }

    /// Resolve a path for mutation. Read-only workspaces are rejected here,
    /// before any backend is consulted.
    fn writable(&self, path: &str) -> VfsResult<Target> {
        let path = normalize_path(path);
        let (workspace, _) = self.registry.resolve(&path)?;
        if workspace.is_read_only() {
            return Err(VfsError::ReadOnly(path));
        }
        self.readable(&path)
    }

    fn backend_of(&self, mount_path: &str) -> VfsResult<Arc<dyn Backend>> {
        self.registry
            .get(mount_path)
            .ok_or_else(|| VfsError::no_workspace(mount_path.to_string()))?
            .backend()
    }

    async fn stat(&mut self, target: &Target, operation: &str) -> VfsResult<NodeKind> {
        let stat = target.backend.stat(&target.relative).await;
        self.guard(&target.mount, operation, stat)?
            .ok_or_else(|| VfsError::not_found(target.path.clone()))
    }

    async fn require_folder(&mut self, target: &Target, operation: &str) -> VfsResult<()> {
        match self.stat(target, operation).await? {
            NodeKind::Folder => Ok(()),
            NodeKind::File => Err(VfsError::invalid_path(format!(
                "not a folder: {}",
                target.path
            ))),
        }
    }

    /// Pass a backend result through, disconnecting the workspace on
    /// `PermissionDenied` and naming the operation in the error.
    fn guard<T>(&mut self, mount_path: &str, operation: &str, result: VfsResult<T>) -> VfsResult<T> {
        match result {
            Err(VfsError::PermissionDenied(what)) => {
                if self.registry.mark_disconnected(mount_path) {
                    warn!(mount = %mount_path, operation, "permission lost, workspace disconnected");
                    self.emit(FsFlow::WorkspaceDisconnected {
                        mount_path: mount_path.to_string(),
                        operation: Some(operation.to_string()),
                    });
                }
                Err(VfsError::PermissionDenied(format!("{operation}: {what}")))
            }
            other => other,
        }
    }

    fn emit(&self, flow: FsFlow) {
        self.bus.publish(flow);
    }

    fn index_root(&mut self, mount_path: &str) {
        if !self.tree.contains(mount_path) {
            if let Err(e) = self.tree.insert(mount_path, NodeKind::Folder) {
                warn!(mount = %mount_path, error = %e, "cannot index workspace root");
            }
        }
    }

    /// Record a new node, re-listing its workspace if the tree has no
    /// parent for it yet.
    async fn track_insert(&mut self, path: &str, kind: NodeKind) {
        if self.tree.contains(path) {
            return;
        }
        if let Err(e) = self.tree.insert(path, kind) {
            debug!(path, error = %e, "tree out of date, resyncing");
            if let Some(mount) = mount_of(path) {
                let mount = mount.to_string();
                self.resync(&mount).await;
            }
        }
    }

    async fn resync(&mut self, mount_path: &str) {
        match projection::sync_workspace(&mut self.registry, &mut self.tree, mount_path).await {
            Ok(()) => {}
            Err(e) if e.is_permission_denied() => {
                warn!(mount = %mount_path, "permission lost while listing, workspace disconnected");
                self.emit(FsFlow::WorkspaceDisconnected {
                    mount_path: mount_path.to_string(),
                    operation: Some("refresh".to_string()),
                });
            }
            Err(e) => warn!(mount = %mount_path, error = %e, "listing failed, keeping cached tree"),
        }
    }

    fn repoint_pending(&mut self, from: &str, to: &str) {
        if self.pending.remove(from) {
            self.pending.insert(to.to_string());
        }
    }
}

/// First free name in `folder`: `base`, then `stem-2.ext`, `stem-3.ext`, ...
async fn free_name(backend: &dyn Backend, folder: &Path, base: &str) -> VfsResult<String> {
    let (stem, ext) = split_extension(base);
    let mut n = 1;
    loop {
        let candidate = if n == 1 {
            base.to_string()
        } else {
            format!("{stem}-{n}{ext}")
        };
        if !backend.exists(&folder.join(&candidate)).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// `("untitled", ".lua")`; dotfiles and extensionless names keep the whole
/// name as the stem.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    }
}

/// Serializes every operation through one queue.
///
/// Clones share the same orchestrator; each [`execute`](Self::execute)
/// waits for the previous one to finish.
#[derive(Clone)]
pub struct SharedOrchestrator {
    inner: Arc<Mutex<Orchestrator>>,
    bus: SharedFlowBus,
}

impl SharedOrchestrator {
    pub fn new(orchestrator: Orchestrator) -> Self {
        let bus = Arc::clone(orchestrator.bus());
        Self {
            inner: Arc::new(Mutex::new(orchestrator)),
            bus,
        }
    }

    pub async fn execute(&self, command: Command) -> VfsResult<Outcome> {
        self.inner.lock().await.execute(command).await
    }

    /// Subscribe without waiting for the queue.
    pub fn subscribe(&self, pattern: &str) -> Subscription<FsFlow> {
        self.bus.subscribe(pattern)
    }

    pub async fn snapshot(&self) -> Vec<TreeNode> {
        self.inner.lock().await.snapshot()
    }

    /// Hold the queue for several calls in a row.
    pub async fn lock(&self) -> MutexGuard<'_, Orchestrator> {
        self.inner.lock().await
    }
}
