//! VFS error types.

use std::io;
use std::path::Path;

use strum::{AsRefStr, Display};
use thiserror::Error;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// File, folder, or workspace not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A sibling with the same name already exists.
    #[error("name conflict: {0}")]
    NameConflict(String),

    /// The same directory is already mounted as a workspace.
    #[error("already mounted: {0}")]
    AlreadyMounted(String),

    /// Access was denied or revoked.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Target lies in a read-only workspace.
    #[error("read-only workspace: {0}")]
    ReadOnly(String),

    /// Storage quota exhausted.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Operation was cancelled by the caller.
    #[error("cancelled")]
    Cancelled,

    /// Malformed path or name.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Path has no owning workspace.
    #[error("no workspace for path: {0}")]
    NoWorkspace(String),

    /// Workspace is disconnected; reconnect first.
    #[error("workspace disconnected: {0}")]
    Disconnected(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(io::Error),
}

/// The error taxonomy surfaced to callers and batch reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum VfsErrorKind {
    NotFound,
    NameConflict,
    AlreadyMounted,
    PermissionDenied,
    ReadOnlyViolation,
    QuotaExceeded,
    IoError,
    Cancelled,
    InvalidPath,
    NoWorkspace,
    Disconnected,
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a NameConflict error.
    pub fn name_conflict(path: impl Into<String>) -> Self {
        Self::NameConflict(path.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create a NoWorkspace error.
    pub fn no_workspace(path: impl Into<String>) -> Self {
        Self::NoWorkspace(path.into())
    }

    /// Create an Io error from any message.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Io(io::Error::other(msg.into()))
    }

    /// Map an I/O error onto the taxonomy, naming the path involved.
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        let shown = path.display().to_string();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(shown),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(shown),
            io::ErrorKind::AlreadyExists => Self::NameConflict(shown),
            io::ErrorKind::StorageFull | io::ErrorKind::QuotaExceeded => {
                Self::QuotaExceeded(shown)
            }
            _ => Self::Io(err),
        }
    }

    /// Which taxonomy bucket this error belongs to.
    pub fn kind(&self) -> VfsErrorKind {
        match self {
            Self::NotFound(_) => VfsErrorKind::NotFound,
            Self::NameConflict(_) => VfsErrorKind::NameConflict,
            Self::AlreadyMounted(_) => VfsErrorKind::AlreadyMounted,
            Self::PermissionDenied(_) => VfsErrorKind::PermissionDenied,
            Self::ReadOnly(_) => VfsErrorKind::ReadOnlyViolation,
            Self::QuotaExceeded(_) => VfsErrorKind::QuotaExceeded,
            Self::Cancelled => VfsErrorKind::Cancelled,
            Self::InvalidPath(_) => VfsErrorKind::InvalidPath,
            Self::NoWorkspace(_) => VfsErrorKind::NoWorkspace,
            Self::Disconnected(_) => VfsErrorKind::Disconnected,
            Self::Io(_) => VfsErrorKind::IoError,
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<io::Error> for VfsError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Self::NotFound(e.to_string()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(e.to_string()),
            io::ErrorKind::AlreadyExists => Self::NameConflict(e.to_string()),
            io::ErrorKind::StorageFull | io::ErrorKind::QuotaExceeded => {
                Self::QuotaExceeded(e.to_string())
            }
            _ => Self::Io(e),
        }
    }
}

impl From<rusqlite::Error> for VfsError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Io(io::Error::other(e))
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_mapping() {
        let p = Path::new("/ws/a.lua");
        let e = VfsError::from_io(io::Error::from(io::ErrorKind::NotFound), p);
        assert!(matches!(e, VfsError::NotFound(ref s) if s == "/ws/a.lua"));

        let e = VfsError::from_io(io::Error::from(io::ErrorKind::PermissionDenied), p);
        assert_eq!(e.kind(), VfsErrorKind::PermissionDenied);

        let e = VfsError::from_io(io::Error::from(io::ErrorKind::AlreadyExists), p);
        assert_eq!(e.kind(), VfsErrorKind::NameConflict);

        let e = VfsError::from_io(io::Error::other("boom"), p);
        assert_eq!(e.kind(), VfsErrorKind::IoError);
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(VfsErrorKind::ReadOnlyViolation.to_string(), "read_only_violation");
        assert_eq!(VfsError::ReadOnly("/lib".into()).kind(), VfsErrorKind::ReadOnlyViolation);
        assert_eq!(VfsError::Cancelled.kind().as_ref(), "cancelled");
    }
}
