//! SQLite persistence for workspace registry entries.
//!
//! Only the `{id, name, type, mountPath, classification}` record is stored.
//! Connection state and directory handles are runtime-only.

use std::path::Path;
use std::str::FromStr;

use canopy_types::{Classification, WorkspaceId, WorkspaceKind, WorkspaceRecord};
use rusqlite::{Connection, params};

use crate::vfs::{VfsError, VfsResult};

const SCHEMA: &str = r#"
-- Registered workspaces, in mount order
CREATE TABLE IF NOT EXISTS workspaces (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    mount_path TEXT NOT NULL UNIQUE,
    classification TEXT NOT NULL,
    position INTEGER NOT NULL
);
"#;

/// Database handle for registry persistence.
pub struct RegistryDb {
    conn: Connection,
}

impl std::fmt::Debug for RegistryDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryDb").finish_non_exhaustive()
    }
}

impl RegistryDb {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> VfsResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> VfsResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Insert or update a record. New records go to the end.
    pub fn save(&self, record: &WorkspaceRecord) -> VfsResult<()> {
        self.conn.execute(
            "INSERT INTO workspaces (id, name, kind, mount_path, classification, position)
             VALUES (?1, ?2, ?3, ?4, ?5,
                     (SELECT COALESCE(MAX(position), -1) + 1 FROM workspaces))
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 mount_path = excluded.mount_path",
            params![
                record.id.to_hex(),
                record.name,
                record.kind.as_ref(),
                record.mount_path,
                record.classification.as_ref(),
            ],
        )?;
        Ok(())
    }

    /// Change the display name of a record.
    pub fn update_name(&self, id: WorkspaceId, name: &str) -> VfsResult<()> {
        self.conn.execute(
            "UPDATE workspaces SET name = ?2 WHERE id = ?1",
            params![id.to_hex(), name],
        )?;
        Ok(())
    }

    /// Delete a record. Deleting an absent record is not an error.
    pub fn delete(&self, id: WorkspaceId) -> VfsResult<()> {
        self.conn
            .execute("DELETE FROM workspaces WHERE id = ?1", params![id.to_hex()])?;
        Ok(())
    }

    /// All records in mount order.
    pub fn list(&self) -> VfsResult<Vec<WorkspaceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, kind, mount_path, classification
             FROM workspaces ORDER BY position",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, name, kind, mount_path, classification) = row?;
            records.push(WorkspaceRecord {
                id: WorkspaceId::parse(&id)
                    .map_err(|e| VfsError::other(format!("bad workspace id {id}: {e}")))?,
                name,
                kind: WorkspaceKind::from_str(&kind)
                    .map_err(|_| VfsError::other(format!("bad workspace kind {kind}")))?,
                mount_path,
                classification: Classification::from_str(&classification).ok_or_else(|| {
                    VfsError::other(format!("bad classification {classification}"))
                })?,
            });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, mount: &str, kind: WorkspaceKind) -> WorkspaceRecord {
        WorkspaceRecord {
            id: WorkspaceId::new(),
            name: name.to_string(),
            kind,
            mount_path: mount.to_string(),
            classification: Classification::Normal,
        }
    }

    #[test]
    fn test_save_and_list_in_order() {
        let db = RegistryDb::in_memory().unwrap();
        let a = record("Scratch", "/scratch", WorkspaceKind::Virtual);
        let b = record("proj", "/proj", WorkspaceKind::Local);
        db.save(&a).unwrap();
        db.save(&b).unwrap();

        assert_eq!(db.list().unwrap(), vec![a.clone(), b.clone()]);

        // Re-saving keeps the original position.
        db.save(&a).unwrap();
        assert_eq!(db.list().unwrap()[0].id, a.id);
    }

    #[test]
    fn test_update_name_and_delete() {
        let db = RegistryDb::in_memory().unwrap();
        let a = record("Scratch", "/scratch", WorkspaceKind::Virtual);
        db.save(&a).unwrap();

        db.update_name(a.id, "Renamed").unwrap();
        let listed = db.list().unwrap();
        assert_eq!(listed[0].name, "Renamed");
        assert_eq!(listed[0].mount_path, "/scratch");

        db.delete(a.id).unwrap();
        assert!(db.list().unwrap().is_empty());
        db.delete(a.id).unwrap();
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("registry.db");
        let a = record("Scratch", "/scratch", WorkspaceKind::Virtual);
        RegistryDb::open(&path).unwrap().save(&a).unwrap();

        assert_eq!(RegistryDb::open(&path).unwrap().list().unwrap(), vec![a]);
    }
}
