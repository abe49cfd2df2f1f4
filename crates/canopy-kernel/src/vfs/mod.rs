//! Storage layer.
//!
//! Key components:
//!
//! - [`Backend`] - Capability interface every workspace storage implements
//! - [`VirtualStore`] / [`VirtualBackend`] - SQLite-persisted content for virtual workspaces
//! - [`LocalBackend`] - Access to a user-granted directory (with path security)
//! - [`DirectoryHandle`] / [`PermissionGrant`] - Revocable local access and the host prompt
//!
//! ## Design Decisions
//!
//! - **Whole-file I/O**: reads and writes move complete contents; there are
//!   no open handles or offsets.
//! - **Backend-relative paths**: the registry strips the mount path before
//!   a backend sees a path, so backends never know where they are mounted.
//! - **Typed failures**: every error maps onto [`VfsErrorKind`].

mod backend;
pub mod backends;
mod error;
mod handle;

pub use backend::{Backend, DirEntry};
pub use backends::{LocalBackend, VirtualBackend, VirtualStore};
pub use error::{VfsError, VfsErrorKind, VfsResult};
pub use handle::{DenyAll, DirectoryHandle, PermissionGrant, StaticGrant};
