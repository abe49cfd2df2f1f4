//! # canopy-kernel
//!
//! Workspace file system core for canopy.
//!
//! Files live in named workspaces mounted at `/<slug>`:
//! - Virtual workspaces are kept in a SQLite store, one namespace each
//! - Local workspaces mirror a user-granted host directory, and drop to
//!   disconnected the moment access is revoked
//! - System workspaces are host-provided and classified (`library` and
//!   `assets` are read-only, `projects` can be cloned from)
//!
//! The [`Orchestrator`] is the single entry point for mutations. It resolves
//! paths through the [`WorkspaceRegistry`], enforces the conflict and
//! cross-workspace policy, asks for confirmation before anything
//! destructive, and publishes what happened on a [`FlowBus`].

pub mod config;
pub mod flows;
pub mod orchestrator;
pub mod path_tree;
pub mod projection;
pub mod registry;
pub mod registry_db;
pub mod vfs;

pub use config::{CanopyConfig, SystemMountConfig};
pub use flows::{
    FlowBus, FlowMessage, FsFlow, HasSubject, SharedFlowBus, Subscription, matches_pattern,
    shared_flow_bus,
};
pub use orchestrator::{
    AlwaysConfirm, Command, ConfirmationRequest, Confirmer, NeverConfirm, Orchestrator, Outcome,
    Prompt, SharedOrchestrator, UploadError, UploadFile, UploadReport, UploadSource, Variant,
};
pub use path_tree::{PathNode, PathTree};
pub use registry::{Workspace, WorkspaceRegistry};
pub use registry_db::RegistryDb;
pub use vfs::{
    Backend, DenyAll, DirEntry, DirectoryHandle, LocalBackend, PermissionGrant, StaticGrant,
    VfsError, VfsErrorKind, VfsResult, VirtualBackend, VirtualStore,
};
