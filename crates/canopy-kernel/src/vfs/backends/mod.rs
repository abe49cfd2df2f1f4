//! Workspace backends.
//!
//! Backends implement [`Backend`](super::Backend) for each storage type:
//! a persisted virtual store and user-granted local directories.

mod local;
mod virtual_store;

pub use local::LocalBackend;
pub use virtual_store::{VirtualBackend, VirtualStore};
