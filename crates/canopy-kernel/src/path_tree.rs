//! Path-indexed node tree.
//!
//! The tree is an index from absolute path to node plus, for every folder,
//! the ordered list of its children's names. Finding a node is one hash lookup;
//! rendering walks the child lists, which keep insertion order. Sorting for
//! display happens in [`projection`](crate::projection), never here.
//!
//! The root `/` always exists. Workspace roots are its children.

use std::collections::HashMap;
use std::path::PathBuf;

use canopy_types::{NodeKind, TreeNode};

use crate::vfs::{VfsError, VfsResult};

/// The root path.
pub const ROOT: &str = "/";

/// One indexed node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathNode {
    pub name: String,
    pub path: String,
    pub kind: NodeKind,
    /// Child names in insertion order. Empty for files.
    pub children: Vec<String>,
}

impl PathNode {
    fn new(name: &str, path: &str, kind: NodeKind) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            kind,
            children: Vec::new(),
        }
    }
}

/// Hierarchical index of files and folders keyed by absolute path.
#[derive(Debug, Clone)]
pub struct PathTree {
    nodes: HashMap<String, PathNode>,
}

impl Default for PathTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PathTree {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT.to_string(), PathNode::new("", ROOT, NodeKind::Folder));
        Self { nodes }
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when only the root exists.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    /// Look up a node. Absence is an ordinary answer, not an error.
    pub fn find(&self, path: &str) -> Option<&PathNode> {
        self.nodes.get(path)
    }

    /// Child names of a folder, in insertion order.
    pub fn children(&self, path: &str) -> Option<&[String]> {
        self.nodes.get(path).map(|n| n.children.as_slice())
    }

    /// Insert a node under an existing folder.
    pub fn insert(&mut self, path: &str, kind: NodeKind) -> VfsResult<()> {
        let (parent, name) =
            split_parent(path).ok_or_else(|| VfsError::invalid_path(path.to_string()))?;
        validate_name(name)?;
        if self.nodes.contains_key(path) {
            return Err(VfsError::name_conflict(path.to_string()));
        }
        let parent_node = self
            .nodes
            .get_mut(parent)
            .ok_or_else(|| VfsError::not_found(parent.to_string()))?;
        if !parent_node.kind.is_folder() {
            return Err(VfsError::invalid_path(format!("not a folder: {parent}")));
        }
        parent_node.children.push(name.to_string());
        self.nodes
            .insert(path.to_string(), PathNode::new(name, path, kind));
        Ok(())
    }

    /// Remove a node and everything below it.
    ///
    /// Returns the removed node, or `None` if it was absent. The root
    /// cannot be removed.
    pub fn remove(&mut self, path: &str) -> Option<PathNode> {
        let (parent, name) = split_parent(path)?;
        let removed = self.nodes.remove(path)?;
        for descendant in self.collect_descendants(&removed) {
            self.nodes.remove(&descendant);
        }
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.retain(|c| c != name);
        }
        Some(removed)
    }

    /// Rename a node in place, keeping its position among its siblings.
    ///
    /// Every descendant is re-keyed under the new prefix. Fails with
    /// `NameConflict` if a sibling already has `new_name` (case-sensitive).
    pub fn rename(&mut self, path: &str, new_name: &str) -> VfsResult<String> {
        validate_name(new_name)?;
        let (parent, old_name) =
            split_parent(path).ok_or_else(|| VfsError::invalid_path("cannot rename the root"))?;
        if !self.nodes.contains_key(path) {
            return Err(VfsError::not_found(path.to_string()));
        }
        if old_name == new_name {
            return Ok(path.to_string());
        }
        let new_path = join(parent, new_name);
        if self.nodes.contains_key(&new_path) {
            return Err(VfsError::name_conflict(new_path));
        }

        let parent = parent.to_string();
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            if let Some(slot) = parent_node.children.iter_mut().find(|c| *c == old_name) {
                *slot = new_name.to_string();
            }
        }
        self.rekey(path, &new_path);
        if let Some(node) = self.nodes.get_mut(&new_path) {
            node.name = new_name.to_string();
        }
        Ok(new_path)
    }

    /// Move a node into another folder, keeping its name.
    pub fn move_to(&mut self, source: &str, target_folder: &str) -> VfsResult<String> {
        let (old_parent, name) =
            split_parent(source).ok_or_else(|| VfsError::invalid_path("cannot move the root"))?;
        if !self.nodes.contains_key(source) {
            return Err(VfsError::not_found(source.to_string()));
        }
        match self.nodes.get(target_folder) {
            None => return Err(VfsError::not_found(target_folder.to_string())),
            Some(n) if !n.kind.is_folder() => {
                return Err(VfsError::invalid_path(format!(
                    "not a folder: {target_folder}"
                )));
            }
            Some(_) => {}
        }
        if is_same_or_under(target_folder, source) {
            return Err(VfsError::invalid_path(format!(
                "cannot move {source} into itself"
            )));
        }
        let new_path = join(target_folder, name);
        if new_path == source {
            return Ok(new_path);
        }
        if self.nodes.contains_key(&new_path) {
            return Err(VfsError::name_conflict(new_path));
        }

        let (old_parent, name) = (old_parent.to_string(), name.to_string());
        if let Some(parent_node) = self.nodes.get_mut(&old_parent) {
            parent_node.children.retain(|c| *c != name);
        }
        if let Some(target) = self.nodes.get_mut(target_folder) {
            target.children.push(name);
        }
        self.rekey(source, &new_path);
        Ok(new_path)
    }

    /// Paths of every node below `path`, parents before children.
    pub fn descendants(&self, path: &str) -> Vec<String> {
        match self.nodes.get(path) {
            Some(node) => self.collect_descendants(node),
            None => Vec::new(),
        }
    }

    /// Swap the contents of a folder for a fresh backend listing.
    ///
    /// `entries` are relative to `root` and must list parents before their
    /// children, as [`Backend::list_recursive`](crate::vfs::Backend::list_recursive)
    /// does. The root node itself keeps its place.
    pub fn replace_subtree(&mut self, root: &str, entries: &[(PathBuf, NodeKind)]) -> VfsResult<()> {
        let node = self
            .nodes
            .get(root)
            .ok_or_else(|| VfsError::not_found(root.to_string()))?;
        for descendant in self.collect_descendants(node) {
            self.nodes.remove(&descendant);
        }
        if let Some(node) = self.nodes.get_mut(root) {
            node.children.clear();
        }

        for (relative, kind) in entries {
            let mut path = root.to_string();
            for component in relative.iter() {
                path = join(&path, &component.to_string_lossy());
            }
            self.insert(&path, *kind)?;
        }
        Ok(())
    }

    /// Owned snapshot of a subtree in insertion order.
    pub fn snapshot(&self, path: &str) -> Option<TreeNode> {
        let node = self.nodes.get(path)?;
        let mut out = match node.kind {
            NodeKind::File => TreeNode::file(&node.name, &node.path),
            NodeKind::Folder => TreeNode::folder(&node.name, &node.path),
        };
        out.children = node
            .children
            .iter()
            .filter_map(|name| self.snapshot(&join(path, name)))
            .collect();
        Some(out)
    }

    fn collect_descendants(&self, node: &PathNode) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack: Vec<String> = node
            .children
            .iter()
            .rev()
            .map(|c| join(&node.path, c))
            .collect();
        while let Some(path) = stack.pop() {
            if let Some(child) = self.nodes.get(&path) {
                stack.extend(child.children.iter().rev().map(|c| join(&path, c)));
            }
            out.push(path);
        }
        out
    }

    /// Re-key `old` and its subtree under `new`.
    fn rekey(&mut self, old: &str, new: &str) {
        let mut paths = vec![old.to_string()];
        if let Some(node) = self.nodes.get(old) {
            paths.extend(self.collect_descendants(node));
        }
        for path in paths {
            if let Some(mut node) = self.nodes.remove(&path) {
                node.path = format!("{new}{}", &path[old.len()..]);
                self.nodes.insert(node.path.clone(), node);
            }
        }
    }
}

/// Join a folder path and a child name.
pub fn join(parent: &str, name: &str) -> String {
    if parent == ROOT || parent.is_empty() {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Split an absolute path into parent path and final name.
///
/// Returns `None` for the root.
pub fn split_parent(path: &str) -> Option<(&str, &str)> {
    let (parent, name) = path.rsplit_once('/')?;
    if name.is_empty() {
        return None;
    }
    Some((if parent.is_empty() { ROOT } else { parent }, name))
}

/// First path segment, as a mount path (`/scratch/a/b` → `/scratch`).
pub fn mount_of(path: &str) -> Option<&str> {
    let rest = path.strip_prefix('/')?;
    if rest.is_empty() {
        return None;
    }
    let end = rest.find('/').map(|i| i + 1).unwrap_or(path.len());
    Some(&path[..end])
}

/// True if `path` equals `ancestor` or lies below it.
pub fn is_same_or_under(path: &str, ancestor: &str) -> bool {
    path == ancestor
        || (path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'/'))
        || ancestor == ROOT
}

/// Normalize to an absolute path, resolving `.` and `..`.
///
/// Relative input is taken from the root. `..` never climbs above `/`.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    if parts.is_empty() {
        ROOT.to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Reject names that cannot be a single path segment.
pub fn validate_name(name: &str) -> VfsResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0')
    {
        return Err(VfsError::invalid_path(format!("invalid name: {name:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PathTree {
        let mut tree = PathTree::new();
        tree.insert("/ws", NodeKind::Folder).unwrap();
        tree.insert("/ws/src", NodeKind::Folder).unwrap();
        tree.insert("/ws/src/main.lua", NodeKind::File).unwrap();
        tree.insert("/ws/src/util", NodeKind::Folder).unwrap();
        tree.insert("/ws/src/util/str.lua", NodeKind::File).unwrap();
        tree.insert("/ws/README.md", NodeKind::File).unwrap();
        tree
    }

    #[test]
    fn test_find_present_and_absent() {
        let tree = sample();
        assert_eq!(tree.find("/ws/src/main.lua").unwrap().kind, NodeKind::File);
        assert!(tree.find("/ws/nope.lua").is_none());
        assert!(tree.find("").is_none());
        assert!(tree.find("/").is_some());
    }

    #[test]
    fn test_insert_requires_folder_parent() {
        let mut tree = sample();
        assert!(tree.insert("/missing/a.lua", NodeKind::File).unwrap_err().is_not_found());
        assert!(matches!(
            tree.insert("/ws/README.md/x", NodeKind::File),
            Err(VfsError::InvalidPath(_))
        ));
        assert!(matches!(
            tree.insert("/ws/src", NodeKind::Folder),
            Err(VfsError::NameConflict(_))
        ));
    }

    #[test]
    fn test_children_keep_insertion_order() {
        let tree = sample();
        assert_eq!(tree.children("/ws").unwrap(), &["src", "README.md"]);
    }

    #[test]
    fn test_rename_rekeys_descendants() {
        let mut tree = sample();
        let new_path = tree.rename("/ws/src", "lib").unwrap();
        assert_eq!(new_path, "/ws/lib");

        assert!(tree.find("/ws/lib/util/str.lua").is_some());
        assert_eq!(tree.find("/ws/lib").unwrap().name, "lib");
        for path in ["/ws/src", "/ws/src/main.lua", "/ws/src/util", "/ws/src/util/str.lua"] {
            assert!(tree.find(path).is_none(), "{path} should be gone");
        }
        // Position among siblings is kept.
        assert_eq!(tree.children("/ws").unwrap(), &["lib", "README.md"]);
        assert_eq!(tree.len(), 7);
    }

    #[test]
    fn test_rename_conflict_is_case_sensitive() {
        let mut tree = sample();
        assert!(matches!(
            tree.rename("/ws/src", "README.md"),
            Err(VfsError::NameConflict(_))
        ));
        assert_eq!(tree.rename("/ws/src", "readme.md").unwrap(), "/ws/readme.md");
        assert!(matches!(tree.rename("/ws/a", "b"), Err(VfsError::NotFound(_))));
        assert!(matches!(tree.rename("/ws/readme.md", "a/b"), Err(VfsError::InvalidPath(_))));
    }

    #[test]
    fn test_remove_drops_whole_subtree() {
        let mut tree = sample();
        let removed = tree.remove("/ws/src").unwrap();
        assert_eq!(removed.kind, NodeKind::Folder);
        for path in ["/ws/src", "/ws/src/main.lua", "/ws/src/util", "/ws/src/util/str.lua"] {
            assert!(tree.find(path).is_none());
        }
        assert_eq!(tree.children("/ws").unwrap(), &["README.md"]);
        assert!(tree.remove("/ws/src").is_none());
        assert!(tree.remove("/").is_none());
    }

    #[test]
    fn test_move_to() {
        let mut tree = sample();
        tree.insert("/other", NodeKind::Folder).unwrap();

        let moved = tree.move_to("/ws/src/util", "/other").unwrap();
        assert_eq!(moved, "/other/util");
        assert!(tree.find("/other/util/str.lua").is_some());
        assert!(tree.find("/ws/src/util").is_none());
        assert_eq!(tree.children("/ws/src").unwrap(), &["main.lua"]);

        assert!(matches!(
            tree.move_to("/ws", "/ws/src"),
            Err(VfsError::InvalidPath(_))
        ));
        tree.insert("/other/main.lua", NodeKind::File).unwrap();
        assert!(matches!(
            tree.move_to("/ws/src/main.lua", "/other"),
            Err(VfsError::NameConflict(_))
        ));
    }

    #[test]
    fn test_replace_subtree() {
        let mut tree = sample();
        let listing = vec![
            (PathBuf::from("a"), NodeKind::Folder),
            (PathBuf::from("a/b.lua"), NodeKind::File),
            (PathBuf::from("c.lua"), NodeKind::File),
        ];
        tree.replace_subtree("/ws", &listing).unwrap();

        assert!(tree.find("/ws/src").is_none());
        assert!(tree.find("/ws/a/b.lua").is_some());
        assert_eq!(tree.children("/ws").unwrap(), &["a", "c.lua"]);
        assert_eq!(tree.descendants("/ws"), vec!["/ws/a", "/ws/a/b.lua", "/ws/c.lua"]);
    }

    #[test]
    fn test_snapshot() {
        let tree = sample();
        let snap = tree.snapshot("/ws").unwrap();
        assert_eq!(snap.count(), 6);
        assert_eq!(snap.children[0].name, "src");
        assert_eq!(
            snap.find("/ws/src/util/str.lua").unwrap().path,
            "/ws/src/util/str.lua"
        );
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(join("/", "ws"), "/ws");
        assert_eq!(join("/ws", "a"), "/ws/a");
        assert_eq!(split_parent("/ws"), Some(("/", "ws")));
        assert_eq!(split_parent("/ws/a/b"), Some(("/ws/a", "b")));
        assert_eq!(split_parent("/"), None);
        assert_eq!(mount_of("/scratch/a/b"), Some("/scratch"));
        assert_eq!(mount_of("/scratch"), Some("/scratch"));
        assert_eq!(mount_of("/"), None);
        assert!(is_same_or_under("/a/b", "/a"));
        assert!(!is_same_or_under("/ab", "/a"));
        assert_eq!(normalize_path("/a/./b/../c/"), "/a/c");
        assert_eq!(normalize_path("../../x"), "/x");
        assert_eq!(normalize_path(""), "/");
        assert!(validate_name("..").is_err());
        assert!(validate_name("main.lua").is_ok());
    }
}
