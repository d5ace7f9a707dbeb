//! Agent configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Tuning for one agent. Defaults match the documented protocol
/// constants; tests shorten the intervals.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Monitor/broadcast period T. Peers are evicted after 3T of silence.
    pub monitor_interval: Duration,

    /// Queue-depth alert threshold for the broadcast gate.
    pub queue_alert_threshold: u64,

    /// Broadcast ceiling; defaults to twice the alert threshold.
    pub queue_ceiling: Option<u64>,

    /// Commit-phase query deadline.
    pub commit_timeout: Duration,

    /// Probe-phase query deadline.
    pub probe_timeout: Duration,

    /// Budget for one latency probe connect.
    pub latency_probe_timeout: Duration,

    /// Re-dispatch evicted peers' workloads through the coordinator path.
    pub respawn_on_node_failure: bool,

    /// Extra wait beyond eviction before re-dispatching, so a recovering
    /// peer is not double-scheduled.
    pub respawn_grace: Duration,

    /// Directory holding `<workload-id>.log` files.
    pub log_dir: PathBuf,

    /// Port every node's API (and thus log endpoint) listens on.
    pub log_service_port: u16,

    /// Core capacity override; `None` uses the host's parallelism.
    pub capacity_cores: Option<u32>,

    /// Advertised price per GB.
    pub price_per_gb: f64,

    /// Advertised reputation.
    pub reputation: f64,

    /// Advertised capability tags.
    pub capabilities: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            monitor_interval: Duration::from_secs(5),
            queue_alert_threshold: 8,
            queue_ceiling: None,
            commit_timeout: Duration::from_secs(90),
            probe_timeout: Duration::from_secs(5),
            latency_probe_timeout: Duration::from_millis(200),
            respawn_on_node_failure: false,
            respawn_grace: Duration::from_secs(10),
            log_dir: PathBuf::from("/var/log/hypercore"),
            log_service_port: 3001,
            capacity_cores: None,
            price_per_gb: 0.0,
            reputation: 1.0,
            capabilities: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Peer eviction threshold: three broadcast periods of silence.
    pub fn eviction_after(&self) -> Duration {
        self.monitor_interval * 3
    }

    /// The effective broadcast-gate ceiling.
    pub fn broadcast_ceiling(&self) -> u64 {
        self.queue_ceiling
            .unwrap_or(self.queue_alert_threshold * 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eviction_is_three_periods() {
        let config = AgentConfig::default();
        assert_eq!(config.eviction_after(), Duration::from_secs(15));
    }

    #[test]
    fn test_ceiling_defaults_to_twice_alert() {
        let config = AgentConfig::default();
        assert_eq!(config.broadcast_ceiling(), 16);

        let pinned = AgentConfig {
            queue_ceiling: Some(5),
            ..AgentConfig::default()
        };
        assert_eq!(pinned.broadcast_ceiling(), 5);
    }
}
