//! Commands, outcomes and confirmation requests.

use std::sync::Arc;

use canopy_types::{FileContent, NodeKind, TreeNode, WorkspaceRecord};
use strum::AsRefStr;
use tokio_util::sync::CancellationToken;

use super::upload::{Confirmer, UploadFile, UploadReport};
use crate::vfs::DirectoryHandle;

/// One request to the orchestrator.
///
/// Every variant either completes, fails, or comes back as
/// [`Outcome::NeedsConfirmation`]; nothing is left half-done between calls.
#[derive(AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Command {
    CreateFile {
        parent: String,
    },
    CreateFolder {
        parent: String,
    },
    /// Submit the rename prompt for a pending creation.
    CommitCreation {
        path: String,
        name: String,
    },
    /// Dismiss the rename prompt; the placeholder is deleted.
    CancelCreation {
        path: String,
    },
    Rename {
        path: String,
        name: String,
    },
    RequestDelete {
        path: String,
    },
    Move {
        source: String,
        target_folder: String,
    },
    Copy {
        source: String,
        target_folder: String,
    },
    WriteFile {
        path: String,
        content: Vec<u8>,
    },
    ReadFile {
        path: String,
    },
    UploadBatch {
        files: Vec<UploadFile>,
        target_folder: String,
        confirm: Arc<dyn Confirmer>,
    },
    UploadFolderBatch {
        files: Vec<UploadFile>,
        target_folder: String,
        confirm: Arc<dyn Confirmer>,
        cancel: CancellationToken,
    },
    CloneProject {
        path: String,
        name: Option<String>,
    },
    AddVirtualWorkspace {
        name: String,
    },
    AddLocalWorkspace {
        name: String,
        handle: DirectoryHandle,
    },
    ReconnectWorkspace {
        mount_path: String,
    },
    DisconnectWorkspace {
        mount_path: String,
    },
    RemoveWorkspace {
        mount_path: String,
    },
    ResolveLocation {
        path: String,
    },
    Refresh,
    /// Accept a confirmation handed back earlier.
    Confirm(ConfirmationRequest),
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// Typed result of a command.
#[derive(Debug)]
pub enum Outcome {
    Created { path: String, kind: NodeKind },
    CreationCancelled { path: String },
    Renamed { from: String, to: String },
    Deleted { path: String },
    Moved { from: String, to: String },
    Copied { from: String, to: String },
    Written { path: String, bytes: usize },
    Content { path: String, content: FileContent },
    Uploaded(UploadReport),
    /// A workspace was added, reconnected, renamed or cloned.
    Workspace(WorkspaceRecord),
    WorkspaceDisconnected { mount_path: String },
    WorkspaceRemoved { mount_path: String },
    Location(String),
    Tree(Vec<TreeNode>),
    /// Nothing has changed yet; pass the request back via
    /// [`Command::Confirm`] to go ahead, or drop it to cancel.
    NeedsConfirmation(ConfirmationRequest),
}

impl Outcome {
    pub fn needs_confirmation(&self) -> bool {
        matches!(self, Outcome::NeedsConfirmation(_))
    }

    pub fn into_confirmation(self) -> Option<ConfirmationRequest> {
        match self {
            Outcome::NeedsConfirmation(request) => Some(request),
            _ => None,
        }
    }

    /// The resulting path for node-level outcomes.
    pub fn path(&self) -> Option<&str> {
        match self {
            Outcome::Created { path, .. }
            | Outcome::CreationCancelled { path }
            | Outcome::Deleted { path }
            | Outcome::Written { path, .. }
            | Outcome::Content { path, .. }
            | Outcome::Location(path) => Some(path),
            Outcome::Renamed { to, .. } | Outcome::Moved { to, .. } | Outcome::Copied { to, .. } => {
                Some(to)
            }
            _ => None,
        }
    }
}

/// Visual weight of a confirmation dialog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Variant {
    Default,
    Danger,
}

/// What a confirmation dialog shows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prompt {
    pub title: String,
    pub message: String,
    pub variant: Variant,
    pub confirm_label: String,
}

impl Prompt {
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        variant: Variant,
        confirm_label: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            variant,
            confirm_label: confirm_label.into(),
        }
    }
}

/// The mutation a confirmation releases.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PendingAction {
    Delete {
        path: String,
    },
    /// Same-workspace move onto an existing path.
    ReplaceMove {
        source: String,
        target_folder: String,
    },
    /// Copy, replacing whatever sits at the destination. Also used for
    /// moves between workspaces.
    Copy {
        source: String,
        target_folder: String,
    },
}

/// A mutation waiting for the user.
///
/// Not `Clone`: [`Command::Confirm`] consumes it, so the action it carries
/// runs at most once. Dropping it is the same as cancelling.
#[derive(Debug)]
pub struct ConfirmationRequest {
    prompt: Prompt,
    pub(crate) action: PendingAction,
}

impl ConfirmationRequest {
    pub(crate) fn new(prompt: Prompt, action: PendingAction) -> Self {
        Self { prompt, action }
    }

    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    pub fn title(&self) -> &str {
        &self.prompt.title
    }

    pub fn message(&self) -> &str {
        &self.prompt.message
    }
}
