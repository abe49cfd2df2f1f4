//! Canopy configuration.
//!
//! Loaded from `~/.config/canopy/config.toml`. Every field has a default,
//! so a missing or empty file is valid.

use std::path::{Path, PathBuf};

use canopy_types::Classification;
use serde::{Deserialize, Serialize};

use crate::vfs::{VfsError, VfsResult};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanopyConfig {
    /// Where the virtual store and registry databases live.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Per-workspace byte cap for virtual workspaces.
    #[serde(default)]
    pub virtual_quota_bytes: Option<u64>,

    /// Name given to a newly created file before the user renames it.
    #[serde(default = "default_placeholder_file")]
    pub placeholder_file_name: String,

    /// Name given to a newly created folder before the user renames it.
    #[serde(default = "default_placeholder_folder")]
    pub placeholder_folder_name: String,

    /// Broadcast capacity of the event bus.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Host directories mounted as classified system workspaces.
    #[serde(default)]
    pub system: Vec<SystemMountConfig>,
}

/// A read-only (or projects) mount provided by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMountConfig {
    /// Display name.
    pub name: String,
    /// Mount path, e.g. `/lib`.
    pub mount: String,
    #[serde(default = "default_system_classification")]
    pub classification: Classification,
    /// Directory on the host.
    pub path: PathBuf,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("canopy")
}

fn default_placeholder_file() -> String {
    "untitled.lua".to_string()
}

fn default_placeholder_folder() -> String {
    "untitled".to_string()
}

fn default_event_capacity() -> usize {
    256
}

fn default_system_classification() -> Classification {
    Classification::Library
}

impl Default for CanopyConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            virtual_quota_bytes: None,
            placeholder_file_name: default_placeholder_file(),
            placeholder_folder_name: default_placeholder_folder(),
            event_capacity: default_event_capacity(),
            system: Vec::new(),
        }
    }
}

impl CanopyConfig {
    /// Parse from TOML text.
    pub fn from_toml_str(text: &str) -> VfsResult<Self> {
        toml::from_str(text).map_err(|e| VfsError::other(format!("invalid config: {e}")))
    }

    /// Load from a file. A missing file yields the defaults.
    pub fn load(path: &Path) -> VfsResult<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| VfsError::from_io(e, path))?;
        Self::from_toml_str(&text)
    }

    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("canopy").join("config.toml"))
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.db")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("registry.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = CanopyConfig::from_toml_str("").unwrap();
        assert_eq!(config, CanopyConfig::default());
        assert_eq!(config.placeholder_file_name, "untitled.lua");
        assert_eq!(config.placeholder_folder_name, "untitled");
        assert!(config.store_path().ends_with("canopy/store.db"));
    }

    #[test]
    fn test_system_mounts() {
        let config = CanopyConfig::from_toml_str(
            r#"
            data_dir = "/tmp/canopy"
            virtual_quota_bytes = 1048576

            [[system]]
            name = "Library"
            mount = "/lib"
            path = "/usr/share/canopy/lib"

            [[system]]
            name = "Projects"
            mount = "/projects"
            classification = "projects"
            path = "/usr/share/canopy/projects"
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/canopy"));
        assert_eq!(config.virtual_quota_bytes, Some(1_048_576));
        assert_eq!(config.system.len(), 2);
        assert_eq!(config.system[0].classification, Classification::Library);
        assert_eq!(config.system[1].classification, Classification::Projects);
    }

    #[test]
    fn test_invalid_config() {
        assert!(CanopyConfig::from_toml_str("event_capacity = \"lots\"").is_err());
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = CanopyConfig::load(&dir.path().join("none.toml")).unwrap();
        assert_eq!(config.event_capacity, 256);
    }
}
