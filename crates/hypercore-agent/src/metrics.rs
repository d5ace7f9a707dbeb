//! Agent metrics.
//!
//! One registry per agent, populated at construction. The metric names
//! are stable interfaces.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// The agent's metric set.
#[derive(Debug)]
pub struct Metrics {
    registry: Registry,

    /// Depth of the outbound gossip queue.
    pub queue_depth: IntGauge,

    /// Live workloads on this node.
    pub workload_count: IntGauge,

    /// Digest broadcasts suppressed by the queue gate.
    pub broadcast_skipped: IntCounter,

    /// Digest changes observed.
    pub state_changes: IntCounter,
}

impl Metrics {
    /// Creates and registers the metric set.
    pub fn new() -> Self {
        let registry = Registry::new();

        let queue_depth =
            IntGauge::new("cluster_queue_depth", "Depth of the outbound gossip queue")
                .expect("metric definition");
        let workload_count =
            IntGauge::new("cluster_workload_count", "Live workloads on this node")
                .expect("metric definition");
        let broadcast_skipped = IntCounter::new(
            "cluster_broadcast_skipped_total",
            "Digest broadcasts suppressed by the queue gate",
        )
        .expect("metric definition");
        let state_changes = IntCounter::new(
            "cluster_state_changes_total",
            "Digest changes observed",
        )
        .expect("metric definition");

        registry
            .register(Box::new(queue_depth.clone()))
            .expect("metric registration");
        registry
            .register(Box::new(workload_count.clone()))
            .expect("metric registration");
        registry
            .register(Box::new(broadcast_skipped.clone()))
            .expect("metric registration");
        registry
            .register(Box::new(state_changes.clone()))
            .expect("metric registration");

        Self {
            registry,
            queue_depth,
            workload_count,
            broadcast_skipped,
            state_changes,
        }
    }

    /// Renders the registry in Prometheus text format.
    pub fn render(&self) -> String {
        let mut out = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut out) {
            tracing::warn!(error = %e, "metrics encoding failed");
        }
        String::from_utf8(out).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_stable() {
        let metrics = Metrics::new();
        metrics.queue_depth.set(3);
        metrics.workload_count.set(2);
        metrics.broadcast_skipped.inc();
        metrics.state_changes.inc();

        let text = metrics.render();
        assert!(text.contains("cluster_queue_depth 3"));
        assert!(text.contains("cluster_workload_count 2"));
        assert!(text.contains("cluster_broadcast_skipped_total 1"));
        assert!(text.contains("cluster_state_changes_total 1"));
    }

    #[test]
    fn test_registries_are_independent() {
        let a = Metrics::new();
        let b = Metrics::new();
        a.state_changes.inc();

        assert!(a.render().contains("cluster_state_changes_total 1"));
        assert!(b.render().contains("cluster_state_changes_total 0"));
    }
}
