//! Workspace classification, kind, status, and the persisted registry record.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::ids::WorkspaceId;

/// Which storage a workspace is backed by.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum WorkspaceKind {
    /// Persisted key-value store owned by canopy.
    Virtual,
    /// A user-granted directory on the host.
    Local,
}

/// Connection state of a workspace.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum WorkspaceStatus {
    Connected,
    Disconnected,
}

impl WorkspaceStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, WorkspaceStatus::Connected)
    }
}

/// Read-only classification of a workspace.
///
/// Fixed when the workspace is created. Everything except `Normal` blocks
/// mutations; `Projects` additionally allows its immediate subfolders to be
/// cloned into a fresh workspace.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Classification {
    #[default]
    Normal,
    Library,
    Docs,
    Book,
    Examples,
    Projects,
}

impl Classification {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// True for every classification that blocks mutation.
    pub fn is_read_only(&self) -> bool {
        !matches!(self, Classification::Normal)
    }

    /// True if immediate subfolders may be cloned into a new workspace.
    pub fn allows_clone(&self) -> bool {
        matches!(self, Classification::Projects)
    }
}

/// The persisted shape of a registry entry.
///
/// Backend handles are deliberately absent: local directory handles do not
/// survive a restart, so local workspaces reload disconnected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRecord {
    pub id: WorkspaceId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: WorkspaceKind,
    pub mount_path: String,
    pub classification: Classification,
}
