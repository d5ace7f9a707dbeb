//! Configuration management for hypercore
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, applied by the caller)
//! 2. Environment variables (`HYPERCORE_*` prefix)
//! 3. `hypercore.local.toml` (gitignored, local overrides)
//! 4. `hypercore.toml` (git-tracked, project config)
//! 5. `~/.config/hypercore/config.toml` (user defaults)
//! 6. Built-in defaults (lowest precedence)

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main hypercore configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HypercoreConfig {
    pub node: NodeConfig,
    pub gossip: GossipSection,
    pub agent: AgentSection,
    pub proxy: ProxySection,
    pub api: ApiSection,
    pub policy: PolicySection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Gossip/RPC bind address.
    pub bind_addr: String,

    /// Base-URL suffix for workload virtual hostnames.
    pub base_url: String,

    /// Seed peers to join at startup.
    pub seeds: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:7946".to_string(),
            base_url: "vm.hypercore.local".to_string(),
            seeds: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GossipSection {
    pub gossip_interval_secs: u64,
    pub probe_interval_secs: u64,
    pub suspicion_multiplier: u32,
    pub fanout: usize,
    pub max_event_payload: usize,
}

impl Default for GossipSection {
    fn default() -> Self {
        Self {
            gossip_interval_secs: 2,
            probe_interval_secs: 5,
            suspicion_multiplier: 6,
            fanout: 2,
            max_event_payload: 8192,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Monitor/broadcast period in seconds.
    pub monitor_interval_secs: u64,

    /// Queue-depth alert threshold; the broadcast gate closes at twice
    /// this unless `queue_ceiling` pins it.
    pub queue_alert_threshold: u64,
    pub queue_ceiling: Option<u64>,

    /// Re-dispatch evicted peers' workloads.
    pub respawn_on_node_failure: bool,
    pub respawn_grace_secs: u64,

    /// Directory holding workload log files.
    pub log_dir: PathBuf,

    /// Core capacity override; unset uses host parallelism.
    pub capacity_cores: Option<u32>,

    /// Advertised placement telemetry.
    pub price_per_gb: f64,
    pub reputation: f64,
    pub capabilities: Vec<String>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            monitor_interval_secs: 5,
            queue_alert_threshold: 8,
            queue_ceiling: None,
            respawn_on_node_failure: false,
            respawn_grace_secs: 10,
            log_dir: PathBuf::from("/var/log/hypercore"),
            capacity_cores: None,
            price_per_gb: 0.0,
            reputation: 1.0,
            capabilities: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySection {
    /// PEM certificate for TLS-terminated ingress listeners.
    pub tls_cert: Option<PathBuf>,

    /// PEM private key.
    pub tls_key: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    /// External HTTP API listen address. The port doubles as the
    /// cluster-wide log-service port, so keep it uniform across nodes.
    pub listen_addr: String,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3001".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    /// Path to the TOML policy file; unset runs permissive.
    pub path: Option<PathBuf>,
}

impl HypercoreConfig {
    /// Load configuration from default locations.
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from a specific project directory.
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Resolve relative paths to absolute.
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();

        if self.agent.log_dir.is_relative() {
            self.agent.log_dir = base.join(&self.agent.log_dir);
        }
        if let Some(path) = &self.policy.path {
            if path.is_relative() {
                self.policy.path = Some(base.join(path));
            }
        }
    }
}
