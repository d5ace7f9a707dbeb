//! Configuration loader with multi-source merging.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::{HypercoreConfig, Paths};

/// Configuration loader with builder pattern.
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader rooted at the current directory.
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "HYPERCORE".to_string(),
        }
    }

    /// Set the project directory.
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "HYPERCORE").
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load configuration from all sources with proper precedence.
    pub fn load(self) -> Result<HypercoreConfig> {
        let mut builder = config::Config::builder();

        // 1. Built-in defaults
        let defaults = HypercoreConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config (~/.config/hypercore/config.toml)
        if let Ok(user_config_file) = Paths::user_config_file() {
            if user_config_file.exists() {
                builder = builder.add_source(
                    config::File::from(user_config_file)
                        .required(false)
                        .format(config::FileFormat::Toml),
                );
            }
        }

        // 3. Project config (hypercore.toml)
        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            builder = builder.add_source(
                config::File::from(project_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 4. Local overrides (hypercore.local.toml, gitignored)
        let local_config_file = Paths::local_config_file(&self.project_dir);
        if local_config_file.exists() {
            builder = builder.add_source(
                config::File::from(local_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 5. Environment variables (HYPERCORE_*)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut hypercore_config: HypercoreConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        hypercore_config.resolve_paths(&self.project_dir);

        Ok(hypercore_config)
    }

    /// Load configuration or fall back to defaults.
    pub fn load_or_default(self) -> HypercoreConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = ConfigLoader::new()
            .with_project_dir(temp_dir.path())
            .load()
            .expect("Failed to load config");

        assert_eq!(config.node.bind_addr, "0.0.0.0:7946");
        assert_eq!(config.gossip.fanout, 2);
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[node]
bind_addr = "10.0.0.5:7946"
base_url = "vm.prod.example.com"
seeds = ["10.0.0.1:7946", "10.0.0.2:7946"]

[agent]
monitor_interval_secs = 10
respawn_on_node_failure = true
"#;
        fs::write(project_dir.join("hypercore.toml"), config_content)
            .expect("Failed to write config");

        let config = ConfigLoader::new()
            .with_project_dir(project_dir)
            .load()
            .expect("Failed to load config");

        assert_eq!(config.node.bind_addr, "10.0.0.5:7946");
        assert_eq!(config.node.base_url, "vm.prod.example.com");
        assert_eq!(config.node.seeds.len(), 2);
        assert_eq!(config.agent.monitor_interval_secs, 10);
        assert!(config.agent.respawn_on_node_failure);
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("hypercore.toml"),
            "[node]\nbase_url = \"vm.project.example\"\n",
        )
        .expect("Failed to write project config");

        fs::write(
            project_dir.join("hypercore.local.toml"),
            "[node]\nbase_url = \"vm.local.example\"\n",
        )
        .expect("Failed to write local config");

        let config = ConfigLoader::new()
            .with_project_dir(project_dir)
            .load()
            .expect("Failed to load config");

        assert_eq!(config.node.base_url, "vm.local.example");
    }

    #[test]
    fn test_relative_log_dir_resolved() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("hypercore.toml"),
            "[agent]\nlog_dir = \"logs\"\n",
        )
        .expect("Failed to write config");

        let config = ConfigLoader::new()
            .with_project_dir(project_dir)
            .load()
            .expect("Failed to load config");

        assert!(config.agent.log_dir.is_absolute());
        assert!(config.agent.log_dir.ends_with("logs"));
    }
}
