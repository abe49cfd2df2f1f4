//! Shared tree and workspace types for canopy.
//!
//! This crate is the data model every consumer sees: the renderer receives
//! [`TreeNode`] snapshots, the registry persists [`WorkspaceRecord`]s, and
//! the virtual store classifies [`FileContent`]. It has **no internal canopy
//! dependencies**.
//!
//! # Key Types
//!
//! |----------------------|-------------------------------------------------|
//! | Type                 | Purpose                                         |
//! |----------------------|-------------------------------------------------|
//! | [`TreeNode`]         | Owned node snapshot (name, path, kind, flags)   |
//! | [`NodeFlags`]        | Workspace classification flags on root nodes    |
//! | [`WorkspaceId`]      | Persisted workspace identity (UUIDv7)           |
//! | [`WorkspaceRecord`]  | What the registry writes to disk                |
//! | [`Classification`]   | normal / library / docs / book / examples / ... |
//! | [`FileContent`]      | Text or binary, decided by extension            |
//! |----------------------|-------------------------------------------------|

pub mod content;
pub mod ids;
pub mod node;
pub mod workspace;

pub use content::{BINARY_EXTENSIONS, FileContent, is_binary_path};
pub use ids::WorkspaceId;
pub use node::{NodeFlags, NodeKind, TreeNode};
pub use workspace::{Classification, WorkspaceKind, WorkspaceRecord, WorkspaceStatus};
