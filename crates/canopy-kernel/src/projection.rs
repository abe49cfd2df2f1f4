//! Tree projection.
//!
//! Rebuilds the renderable tree from the registry plus each workspace's
//! backend listing. Nothing is diffed: a connected workspace's subtree is
//! replaced wholesale by a fresh listing. A disconnected workspace keeps
//! whatever was last read successfully, flagged `isDisconnected`.

use std::cmp::Ordering;
use std::path::Path;

use canopy_types::{NodeFlags, NodeKind, TreeNode};
use tracing::{debug, warn};

use crate::path_tree::{PathTree, ROOT};
use crate::registry::WorkspaceRegistry;
use crate::vfs::{VfsError, VfsResult};

/// Re-read one workspace into the tree.
///
/// The root node is created if missing. A `PermissionDenied` while listing
/// disconnects the workspace and leaves its cached subtree untouched; the
/// error is returned so the caller can report the disconnect.
pub async fn sync_workspace(
    registry: &mut WorkspaceRegistry,
    tree: &mut PathTree,
    mount_path: &str,
) -> VfsResult<()> {
    let workspace = registry
        .get(mount_path)
        .ok_or_else(|| VfsError::no_workspace(mount_path.to_string()))?;
    if !tree.contains(mount_path) {
        tree.insert(mount_path, NodeKind::Folder)?;
    }
    if !workspace.is_connected() {
        return Ok(());
    }
    let backend = workspace.backend()?;

    match backend.list_recursive(Path::new("")).await {
        Ok(entries) => {
            debug!(mount = %mount_path, entries = entries.len(), "workspace listed");
            tree.replace_subtree(mount_path, &entries)
        }
        Err(e) if e.is_permission_denied() => {
            registry.mark_disconnected(mount_path);
            Err(e)
        }
        Err(e) => Err(e),
    }
}

/// Re-read every workspace.
///
/// Returns the mount paths that were disconnected by a `PermissionDenied`
/// during the listing. Other listing failures keep the cached contents.
pub async fn rebuild(registry: &mut WorkspaceRegistry, tree: &mut PathTree) -> Vec<String> {
    // Drop roots of workspaces that are no longer registered.
    let stale: Vec<String> = tree
        .children(ROOT)
        .unwrap_or_default()
        .iter()
        .map(|name| format!("/{name}"))
        .filter(|mount| registry.get(mount).is_none())
        .collect();
    for mount in stale {
        tree.remove(&mount);
    }

    let mounts: Vec<String> = registry
        .workspaces()
        .iter()
        .map(|w| w.mount_path.clone())
        .collect();
    let mut disconnected = Vec::new();
    for mount in mounts {
        match sync_workspace(registry, tree, &mount).await {
            Ok(()) => {}
            Err(e) if e.is_permission_denied() => {
                warn!(mount = %mount, error = %e, "listing denied, workspace disconnected");
                disconnected.push(mount);
            }
            Err(e) => warn!(mount = %mount, error = %e, "listing failed, keeping cached tree"),
        }
    }
    disconnected
}

/// Snapshot the tree as renderable roots, one per workspace in registry order.
///
/// Root nodes carry the workspace's display name and classification flags.
/// Siblings are sorted folders first, then by name.
pub fn project(registry: &WorkspaceRegistry, tree: &PathTree) -> Vec<TreeNode> {
    registry
        .workspaces()
        .iter()
        .filter_map(|workspace| {
            let mut root = tree.snapshot(&workspace.mount_path)?;
            root.name = workspace.name.clone();
            root.flags = NodeFlags::workspace(
                workspace.classification,
                workspace.kind,
                workspace.status,
            );
            sort_children(&mut root);
            Some(root)
        })
        .collect()
}

/// Folders before files, then case-insensitive by name; ties break
/// case-sensitively so the order is total.
pub fn compare_nodes(a: &TreeNode, b: &TreeNode) -> Ordering {
    b.is_folder()
        .cmp(&a.is_folder())
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}

fn sort_children(node: &mut TreeNode) {
    node.children.sort_by(compare_nodes);
    for child in &mut node.children {
        sort_children(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::vfs::{DenyAll, DirectoryHandle, VirtualStore};
    use tempfile::TempDir;

    fn registry() -> WorkspaceRegistry {
        let store = Arc::new(VirtualStore::in_memory().unwrap());
        WorkspaceRegistry::new(store, Arc::new(DenyAll))
    }

    #[test]
    fn test_compare_nodes() {
        let mut nodes = vec![
            TreeNode::file("b.lua", "/w/b.lua"),
            TreeNode::folder("zeta", "/w/zeta"),
            TreeNode::file("B.lua", "/w/B.lua"),
            TreeNode::file("a.lua", "/w/a.lua"),
            TreeNode::folder("Alpha", "/w/Alpha"),
        ];
        nodes.sort_by(compare_nodes);
        let names: Vec<_> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "zeta", "a.lua", "B.lua", "b.lua"]);
    }

    #[tokio::test]
    async fn test_rebuild_and_project() {
        let mut reg = registry();
        let ws = reg.add_virtual_workspace("Scratch").unwrap();
        let backend = ws.backend().unwrap();
        backend.write(Path::new("main.lua"), b"").await.unwrap();
        backend.mkdir(Path::new("src")).await.unwrap();
        backend.write(Path::new("src/util.lua"), b"").await.unwrap();

        let mut tree = PathTree::new();
        assert!(rebuild(&mut reg, &mut tree).await.is_empty());

        let roots = project(&reg, &tree);
        assert_eq!(roots.len(), 1);
        let root = &roots[0];
        assert_eq!(root.name, "Scratch");
        assert_eq!(root.path, "/scratch");
        assert!(root.flags.is_workspace);
        assert!(!root.flags.is_local_workspace);
        assert_eq!(root.children[0].name, "src");
        assert_eq!(root.children[1].name, "main.lua");
        assert!(root.find("/scratch/src/util.lua").is_some());
    }

    #[tokio::test]
    async fn test_revoked_local_keeps_cached_contents() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.lua"), "x").unwrap();
        let handle = DirectoryHandle::open(dir.path()).unwrap();

        let mut reg = registry();
        reg.add_local_workspace("proj", handle.clone()).await.unwrap();
        let mut tree = PathTree::new();
        rebuild(&mut reg, &mut tree).await;
        assert!(tree.find("/proj/a.lua").is_some());

        handle.revoke();
        let disconnected = rebuild(&mut reg, &mut tree).await;
        assert_eq!(disconnected, vec!["/proj".to_string()]);

        let roots = project(&reg, &tree);
        assert!(roots[0].flags.is_disconnected);
        assert!(roots[0].flags.is_local_workspace);
        assert!(roots[0].find("/proj/a.lua").is_some());
    }

    #[tokio::test]
    async fn test_rebuild_drops_removed_workspaces() {
        let mut reg = registry();
        reg.add_virtual_workspace("Scratch").unwrap();
        let mut tree = PathTree::new();
        rebuild(&mut reg, &mut tree).await;
        assert!(tree.contains("/scratch"));

        reg.remove_workspace("/scratch").await.unwrap();
        rebuild(&mut reg, &mut tree).await;
        assert!(!tree.contains("/scratch"));
        assert!(project(&reg, &tree).is_empty());
    }
}
