//! Policy definition and file loading.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;

/// Errors loading a policy file.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A scoring weight is negative.
    #[error("negative scoring weight: {0}")]
    NegativeWeight(f64),
}

/// Enforcement mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyMode {
    /// Hard filter and descriptor rules apply.
    Enforce,

    /// Everything admits; scoring still ranks.
    #[default]
    Permissive,
}

/// Hard admission filter over peer telemetry. Unset bounds don't filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HardFilter {
    /// Capabilities a candidate must advertise.
    pub required_capabilities: Vec<String>,
    pub max_latency_ms: Option<f64>,
    pub max_price_per_gb: Option<f64>,
    pub min_reputation: Option<f64>,
    pub max_queue_depth: Option<u64>,
    pub max_packet_loss: Option<f64>,
    pub max_jitter_ms: Option<f64>,
}

/// Non-negative weights over the four scored metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScoreWeights {
    pub latency: f64,
    pub price: f64,
    pub reputation: f64,
    pub queue_depth: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            latency: 1.0,
            price: 1.0,
            reputation: 1.0,
            queue_depth: 1.0,
        }
    }
}

/// Descriptor-level admission rules. Unset bounds don't reject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SpawnRules {
    pub max_cores: Option<u32>,
    pub max_memory_mib: Option<u32>,
    pub max_ports: Option<usize>,

    /// When non-empty, the image reference must start with one of these.
    pub allowed_image_prefixes: Vec<String>,
}

/// The admission/scoring policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Policy {
    pub mode: PolicyMode,
    pub filter: HardFilter,
    pub weights: ScoreWeights,
    pub rules: SpawnRules,
}

impl Policy {
    /// A permissive policy with default weights.
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Loads a policy from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let policy: Self = toml::from_str(&text)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Rejects malformed policies (negative weights).
    pub fn validate(&self) -> Result<()> {
        for w in [
            self.weights.latency,
            self.weights.price,
            self.weights.reputation,
            self.weights.queue_depth,
        ] {
            if w < 0.0 {
                return Err(PolicyError::NegativeWeight(w));
            }
        }
        Ok(())
    }
}
