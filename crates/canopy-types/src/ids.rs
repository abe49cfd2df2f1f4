//! Typed identifier for workspaces.
//!
//! `WorkspaceId` wraps a UUIDv7 (time-ordered, globally unique). It is the
//! persisted identity of a registry entry and the namespace key of the
//! virtual store. The `short()` form (first 8 hex chars) is for logs and
//! human-facing UI, never used as a lookup key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A workspace identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(uuid::Uuid);

impl WorkspaceId {
    /// Create a new time-ordered ID (UUIDv7).
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// First 8 hex characters, for display only.
    pub fn short(&self) -> String {
        self.0.as_simple().to_string()[..8].to_string()
    }

    /// Full 32-character hex string (no hyphens).
    pub fn to_hex(&self) -> String {
        self.0.as_simple().to_string()
    }

    /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        uuid::Uuid::parse_str(s).map(Self)
    }

    /// The all-zero ID, used as a sentinel.
    pub fn nil() -> Self {
        Self(uuid::Uuid::nil())
    }

    /// Check if this is the nil ID.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for WorkspaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<uuid::Uuid> for WorkspaceId {
    fn from(u: uuid::Uuid) -> Self {
        Self(u)
    }
}

impl From<WorkspaceId> for uuid::Uuid {
    fn from(id: WorkspaceId) -> uuid::Uuid {
        id.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full UUID with hyphens for log readability
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkspaceId({})", self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = WorkspaceId::new();
        let b = WorkspaceId::new();
        assert_ne!(a, b);
        assert!(!a.is_nil());
        assert!(WorkspaceId::nil().is_nil());
    }

    #[test]
    fn test_parse_roundtrips_display_and_hex() {
        let id = WorkspaceId::new();
        assert_eq!(WorkspaceId::parse(&id.to_string()).unwrap(), id);
        assert_eq!(WorkspaceId::parse(&id.to_hex()).unwrap(), id);
        assert!(WorkspaceId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_short_is_hex_prefix() {
        let id = WorkspaceId::new();
        assert_eq!(id.short().len(), 8);
        assert!(id.to_hex().starts_with(&id.short()));
        assert!(format!("{:?}", id).starts_with("WorkspaceId("));
    }
}
