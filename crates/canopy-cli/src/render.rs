//! Plain-text rendering of outcomes.

use canopy_kernel::UploadReport;
use canopy_types::{NodeFlags, TreeNode, WorkspaceRecord};

/// Draw the workspace roots and everything below them.
pub fn tree(roots: &[TreeNode]) -> String {
    let mut out = String::new();
    for root in roots {
        out.push_str(&format!("{} ({}){}\n", root.name, root.path, tags(&root.flags)));
        draw_children(&root.children, "", &mut out);
    }
    out
}

fn draw_children(children: &[TreeNode], indent: &str, out: &mut String) {
    for (i, child) in children.iter().enumerate() {
        let last = i + 1 == children.len();
        let branch = if last { "└── " } else { "├── " };
        let suffix = if child.is_folder() { "/" } else { "" };
        out.push_str(&format!("{indent}{branch}{}{suffix}\n", child.name));
        if child.is_folder() {
            let next = format!("{indent}{}", if last { "    " } else { "│   " });
            draw_children(&child.children, &next, out);
        }
    }
}

fn tags(flags: &NodeFlags) -> String {
    let mut tags = Vec::new();
    if flags.is_local_workspace {
        tags.push("local");
    }
    if flags.is_projects_workspace {
        tags.push("projects");
    } else if flags.is_read_only() {
        tags.push("read-only");
    }
    if flags.is_disconnected {
        tags.push("disconnected");
    }
    if tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", tags.join(", "))
    }
}

/// One-line upload summary, then one line per failed file.
pub fn report(report: &UploadReport) -> String {
    let mut out = format!(
        "{} uploaded, {} replaced, {} skipped, {} failed",
        report.success, report.replaced, report.skipped, report.failed
    );
    if report.cancelled {
        out.push_str(" (cancelled)");
    }
    for error in &report.errors {
        out.push_str(&format!("\n  {}: {}", error.name, error.message));
    }
    out
}

/// One line per virtual workspace, with the quota when one is set.
pub fn usage(rows: &[(WorkspaceRecord, u64)], quota: Option<u64>) -> String {
    let mut out = String::new();
    for (record, used) in rows {
        match quota {
            Some(quota) => out.push_str(&format!(
                "{} ({}): {used} of {quota} bytes\n",
                record.name, record.mount_path
            )),
            None => out.push_str(&format!("{} ({}): {used} bytes\n", record.name, record.mount_path)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_types::{Classification, WorkspaceKind, WorkspaceStatus};

    #[test]
    fn test_tree_drawing() {
        let mut root = TreeNode::folder("Scratch", "/scratch");
        root.flags = NodeFlags::workspace(
            Classification::Normal,
            WorkspaceKind::Local,
            WorkspaceStatus::Disconnected,
        );
        let mut src = TreeNode::folder("src", "/scratch/src");
        src.children.push(TreeNode::file("util.lua", "/scratch/src/util.lua"));
        root.children.push(src);
        root.children.push(TreeNode::file("main.lua", "/scratch/main.lua"));

        assert_eq!(
            tree(&[root]),
            "Scratch (/scratch) [local, disconnected]\n\
             ├── src/\n\
             │   └── util.lua\n\
             └── main.lua\n"
        );
    }

    #[test]
    fn test_read_only_tag() {
        let flags = NodeFlags::workspace(
            Classification::Library,
            WorkspaceKind::Virtual,
            WorkspaceStatus::Connected,
        );
        assert_eq!(tags(&flags), " [read-only]");
        assert_eq!(tags(&NodeFlags::default()), "");
    }

    #[test]
    fn test_usage_lines() {
        let record = WorkspaceRecord {
            id: canopy_types::WorkspaceId::new(),
            name: "Scratch".into(),
            kind: WorkspaceKind::Virtual,
            mount_path: "/scratch".into(),
            classification: Classification::Normal,
        };
        let rows = vec![(record, 12)];
        assert_eq!(usage(&rows, None), "Scratch (/scratch): 12 bytes\n");
        assert_eq!(usage(&rows, Some(100)), "Scratch (/scratch): 12 of 100 bytes\n");
    }

    #[test]
    fn test_report_summary() {
        let report = UploadReport {
            success: 2,
            replaced: 1,
            cancelled: true,
            ..Default::default()
        };
        assert_eq!(
            super::report(&report),
            "2 uploaded, 1 replaced, 0 skipped, 0 failed (cancelled)"
        );
    }
}
