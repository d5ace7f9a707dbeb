//! Well-known configuration file locations.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::ConfigError;

/// Resolves configuration file paths.
pub struct Paths;

impl Paths {
    /// `~/.config/hypercore/config.toml` (platform equivalent).
    pub fn user_config_file() -> Result<PathBuf, ConfigError> {
        ProjectDirs::from("", "", "hypercore")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or(ConfigError::NoUserConfigDir)
    }

    /// `<project>/hypercore.toml`, git-tracked.
    pub fn project_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join("hypercore.toml")
    }

    /// `<project>/hypercore.local.toml`, gitignored overrides.
    pub fn local_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join("hypercore.local.toml")
    }
}
