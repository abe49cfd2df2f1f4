//! Persisted virtual store backend.
//!
//! Content lives in SQLite, keyed by `(namespace, path)`. One store file
//! serves every virtual workspace; each workspace's [`VirtualBackend`] is a
//! namespaced view onto it. Removing a workspace drops its namespace.
//!
//! Text/binary handling follows the extension allowlist in
//! [`canopy_types::content`]: text files are stored in the `text` column,
//! binary ones in `data`.

use std::path::{Component, Path};
use std::sync::Arc;

use async_trait::async_trait;
use canopy_types::{FileContent, NodeKind, WorkspaceId, WorkspaceKind};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::vfs::backend::{Backend, DirEntry};
use crate::vfs::error::{VfsError, VfsResult};

const SCHEMA: &str = r#"
-- Every file and folder of every virtual workspace. The root ("") is implicit.
CREATE TABLE IF NOT EXISTS entries (
    namespace TEXT NOT NULL,
    path TEXT NOT NULL,
    kind TEXT NOT NULL,
    text TEXT,
    data BLOB,
    size INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (namespace, path)
);
"#;

const KIND_FILE: &str = "file";
const KIND_FOLDER: &str = "folder";

/// Shared SQLite store for all virtual workspaces.
pub struct VirtualStore {
    conn: Mutex<Connection>,
    quota_bytes: Option<u64>,
}

impl std::fmt::Debug for VirtualStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualStore")
            .field("quota_bytes", &self.quota_bytes)
            .finish_non_exhaustive()
    }
}

impl VirtualStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> VfsResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            quota_bytes: None,
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> VfsResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            quota_bytes: None,
        })
    }

    /// Cap the total file bytes of each workspace.
    pub fn with_quota(mut self, quota_bytes: Option<u64>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    pub fn quota_bytes(&self) -> Option<u64> {
        self.quota_bytes
    }

    /// A backend scoped to one workspace.
    pub fn backend(self: &Arc<Self>, workspace: WorkspaceId) -> VirtualBackend {
        VirtualBackend {
            store: Arc::clone(self),
            namespace: workspace.to_hex(),
        }
    }

    /// Total file bytes stored for a workspace.
    pub fn usage(&self, workspace: WorkspaceId) -> VfsResult<u64> {
        let conn = self.conn.lock();
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(size), 0) FROM entries WHERE namespace = ?1",
            params![workspace.to_hex()],
            |row| row.get(0),
        )?;
        Ok(total as u64)
    }
}

/// Normalize a backend-relative path into a store key (`a/b/c`).
///
/// `..` may not climb above the root.
fn key(path: &Path) -> VfsResult<String> {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(s) => parts.push(s.to_string_lossy().into_owned()),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(VfsError::invalid_path(path.display().to_string()));
                }
            }
            Component::Prefix(_) => {
                return Err(VfsError::invalid_path(path.display().to_string()));
            }
        }
    }
    Ok(parts.join("/"))
}

fn parent_key(key: &str) -> &str {
    key.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn kind_from_str(s: &str) -> NodeKind {
    if s == KIND_FOLDER {
        NodeKind::Folder
    } else {
        NodeKind::File
    }
}

/// One virtual workspace's view onto the [`VirtualStore`].
#[derive(Debug, Clone)]
pub struct VirtualBackend {
    store: Arc<VirtualStore>,
    namespace: String,
}

impl VirtualBackend {
    fn kind_at(&self, conn: &Connection, key: &str) -> VfsResult<Option<NodeKind>> {
        if key.is_empty() {
            return Ok(Some(NodeKind::Folder));
        }
        let kind: Option<String> = conn
            .query_row(
                "SELECT kind FROM entries WHERE namespace = ?1 AND path = ?2",
                params![self.namespace, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(kind.as_deref().map(kind_from_str))
    }

    fn require_folder(&self, conn: &Connection, key: &str) -> VfsResult<()> {
        match self.kind_at(conn, key)? {
            Some(NodeKind::Folder) => Ok(()),
            Some(NodeKind::File) => Err(VfsError::invalid_path(format!("not a folder: {key}"))),
            None => Err(VfsError::not_found(key.to_string())),
        }
    }
}

#[async_trait]
impl Backend for VirtualBackend {
    fn kind(&self) -> WorkspaceKind {
        WorkspaceKind::Virtual
    }

    async fn stat(&self, path: &Path) -> VfsResult<Option<NodeKind>> {
        let key = key(path)?;
        let conn = self.store.conn.lock();
        self.kind_at(&conn, &key)
    }

    async fn list(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let key = key(path)?;
        let conn = self.store.conn.lock();
        self.require_folder(&conn, &key)?;

        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{key}/")
        };
        let mut stmt = conn.prepare(
            "SELECT path, kind FROM entries
             WHERE namespace = ?1 AND substr(path, 1, length(?2)) = ?2
             ORDER BY path",
        )?;
        let rows = stmt.query_map(params![self.namespace, prefix], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (entry_path, kind) = row?;
            let rest = &entry_path[prefix.len()..];
            if !rest.is_empty() && !rest.contains('/') {
                entries.push(DirEntry::new(rest, kind_from_str(&kind)));
            }
        }
        Ok(entries)
    }

    async fn read(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let key = key(path)?;
        let conn = self.store.conn.lock();
        let row: Option<(String, Option<String>, Option<Vec<u8>>)> = conn
            .query_row(
                "SELECT kind, text, data FROM entries WHERE namespace = ?1 AND path = ?2",
                params![self.namespace, key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match row {
            None => Err(VfsError::not_found(key)),
            Some((kind, _, _)) if kind == KIND_FOLDER => {
                Err(VfsError::invalid_path(format!("is a folder: {key}")))
            }
            Some((_, Some(text), _)) => Ok(text.into_bytes()),
            Some((_, None, data)) => Ok(data.unwrap_or_default()),
        }
    }

    async fn write(&self, path: &Path, data: &[u8]) -> VfsResult<()> {
        let key = key(path)?;
        if key.is_empty() {
            return Err(VfsError::invalid_path("cannot write the workspace root"));
        }
        let conn = self.store.conn.lock();
        self.require_folder(&conn, parent_key(&key))?;
        if self.kind_at(&conn, &key)? == Some(NodeKind::Folder) {
            return Err(VfsError::invalid_path(format!("is a folder: {key}")));
        }

        if let Some(quota) = self.store.quota_bytes {
            let others: i64 = conn.query_row(
                "SELECT COALESCE(SUM(size), 0) FROM entries WHERE namespace = ?1 AND path != ?2",
                params![self.namespace, key],
                |row| row.get(0),
            )?;
            if others as u64 + data.len() as u64 > quota {
                return Err(VfsError::QuotaExceeded(format!(
                    "{key}: {} bytes would exceed {quota}",
                    others as u64 + data.len() as u64
                )));
            }
        }

        let (text, blob) = match FileContent::from_bytes(&key, data.to_vec()) {
            FileContent::Text(t) => (Some(t), None),
            FileContent::Binary(b) => (None, Some(b)),
        };
        debug!(namespace = %self.namespace, path = %key, bytes = data.len(), "virtual write");
        conn.execute(
            "INSERT OR REPLACE INTO entries (namespace, path, kind, text, data, size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![self.namespace, key, KIND_FILE, text, blob, data.len() as i64],
        )?;
        Ok(())
    }

    async fn mkdir(&self, path: &Path) -> VfsResult<()> {
        let key = key(path)?;
        let conn = self.store.conn.lock();
        if self.kind_at(&conn, &key)?.is_some() {
            return Err(VfsError::name_conflict(key));
        }
        self.require_folder(&conn, parent_key(&key))?;
        conn.execute(
            "INSERT INTO entries (namespace, path, kind) VALUES (?1, ?2, ?3)",
            params![self.namespace, key, KIND_FOLDER],
        )?;
        Ok(())
    }

    async fn delete(&self, path: &Path) -> VfsResult<()> {
        let key = key(path)?;
        if key.is_empty() {
            return Err(VfsError::invalid_path("cannot delete the workspace root"));
        }
        let conn = self.store.conn.lock();
        if self.kind_at(&conn, &key)?.is_none() {
            return Err(VfsError::not_found(key));
        }
        debug!(namespace = %self.namespace, path = %key, "virtual delete");
        conn.execute(
            "DELETE FROM entries
             WHERE namespace = ?1 AND (path = ?2 OR substr(path, 1, length(?2) + 1) = ?2 || '/')",
            params![self.namespace, key],
        )?;
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        let from_key = key(from)?;
        let to_key = key(to)?;
        if from_key.is_empty() || to_key.is_empty() {
            return Err(VfsError::invalid_path("cannot rename the workspace root"));
        }
        if to_key == from_key || to_key.starts_with(&format!("{from_key}/")) {
            return Err(VfsError::invalid_path(format!(
                "cannot move {from_key} into itself"
            )));
        }

        let mut conn = self.store.conn.lock();
        if self.kind_at(&conn, &from_key)?.is_none() {
            return Err(VfsError::not_found(from_key));
        }
        if self.kind_at(&conn, &to_key)?.is_some() {
            return Err(VfsError::name_conflict(to_key));
        }
        self.require_folder(&conn, parent_key(&to_key))?;

        // One statement inside one transaction: the subtree moves as a unit.
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE entries SET path = ?3 || substr(path, length(?2) + 1)
             WHERE namespace = ?1 AND (path = ?2 OR substr(path, 1, length(?2) + 1) = ?2 || '/')",
            params![self.namespace, from_key, to_key],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn destroy(&self) -> VfsResult<()> {
        let conn = self.store.conn.lock();
        let removed = conn.execute(
            "DELETE FROM entries WHERE namespace = ?1",
            params![self.namespace],
        )?;
        debug!(namespace = %self.namespace, removed, "virtual namespace destroyed");
        Ok(())
    }
}
