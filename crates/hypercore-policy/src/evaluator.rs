//! Policy evaluation: admission and candidate ranking.

use std::collections::HashMap;

use tracing::debug;

use hypercore_types::{Telemetry, VmSpawnRequest};

use crate::policy::{Policy, PolicyMode};

/// Outcome of descriptor admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Deny { reason: String },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self::Deny {
            reason: reason.into(),
        }
    }
}

impl Policy {
    /// Evaluates a descriptor against the policy's spawn rules.
    ///
    /// Permissive mode always allows. The denial reason is surfaced to
    /// the client verbatim.
    pub fn can_spawn(&self, spec: &VmSpawnRequest) -> Admission {
        if self.mode == PolicyMode::Permissive {
            return Admission::Allow;
        }

        if let Some(max) = self.rules.max_cores {
            if spec.cores > max {
                return Admission::deny(format!(
                    "requested {} cores exceeds policy maximum {max}",
                    spec.cores
                ));
            }
        }
        if let Some(max) = self.rules.max_memory_mib {
            if spec.memory_mib > max {
                return Admission::deny(format!(
                    "requested {} MiB exceeds policy maximum {max} MiB",
                    spec.memory_mib
                ));
            }
        }
        if let Some(max) = self.rules.max_ports {
            if spec.ports.len() > max {
                return Admission::deny(format!(
                    "{} port mappings exceed policy maximum {max}",
                    spec.ports.len()
                ));
            }
        }
        if !self.rules.allowed_image_prefixes.is_empty()
            && !self
                .rules
                .allowed_image_prefixes
                .iter()
                .any(|p| spec.image_ref.starts_with(p))
        {
            return Admission::deny(format!(
                "image {:?} does not match any allowed prefix",
                spec.image_ref
            ));
        }

        Admission::Allow
    }

    /// Ranks candidate nodes for placement, best first.
    ///
    /// Each alive member's latest telemetry is scored as
    /// `Σ wᵢ · normalizedᵢ` with min-max scaling inside the candidate
    /// set; smaller is better for latency, price, and queue depth, larger
    /// is better for reputation. In enforce mode candidates failing any
    /// hard-filter bound (or lacking telemetry) are dropped first. Ties
    /// break lexicographically by node id. An empty result tells the
    /// caller to fall back to broadcast admission.
    pub fn select_nodes(
        &self,
        members: &[String],
        telemetry: &HashMap<String, Telemetry>,
    ) -> Vec<String> {
        let default = Telemetry::default();
        let candidates: Vec<(&String, &Telemetry)> = members
            .iter()
            .filter_map(|name| match (telemetry.get(name), self.mode) {
                (Some(t), PolicyMode::Enforce) => self.passes_filter(t).then_some((name, t)),
                (Some(t), PolicyMode::Permissive) => Some((name, t)),
                // Without a beacon there is nothing to verify against.
                (None, PolicyMode::Enforce) => None,
                (None, PolicyMode::Permissive) => Some((name, &default)),
            })
            .collect();

        if candidates.is_empty() {
            return Vec::new();
        }

        let latency = Scale::over(candidates.iter().map(|(_, t)| t.latency_ms));
        let price = Scale::over(candidates.iter().map(|(_, t)| t.price_per_gb));
        let reputation = Scale::over(candidates.iter().map(|(_, t)| t.reputation));
        let queue = Scale::over(candidates.iter().map(|(_, t)| t.queue_depth as f64));

        let mut scored: Vec<(String, f64)> = candidates
            .into_iter()
            .map(|(name, t)| {
                let score = self.weights.latency * latency.smaller_is_better(t.latency_ms)
                    + self.weights.price * price.smaller_is_better(t.price_per_gb)
                    + self.weights.reputation * reputation.larger_is_better(t.reputation)
                    + self.weights.queue_depth * queue.smaller_is_better(t.queue_depth as f64);
                debug!(node = %name, score, "candidate scored");
                (name.clone(), score)
            })
            .collect();

        scored.sort_by(|(a_name, a), (b_name, b)| {
            b.partial_cmp(a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a_name.cmp(b_name))
        });

        scored.into_iter().map(|(name, _)| name).collect()
    }

    fn passes_filter(&self, t: &Telemetry) -> bool {
        let f = &self.filter;

        if !f
            .required_capabilities
            .iter()
            .all(|cap| t.capabilities.contains(cap))
        {
            return false;
        }
        if f.max_latency_ms.is_some_and(|max| t.latency_ms > max) {
            return false;
        }
        if f.max_price_per_gb.is_some_and(|max| t.price_per_gb > max) {
            return false;
        }
        if f.min_reputation.is_some_and(|min| t.reputation < min) {
            return false;
        }
        if f.max_queue_depth.is_some_and(|max| t.queue_depth > max) {
            return false;
        }
        if f.max_packet_loss.is_some_and(|max| t.packet_loss > max) {
            return false;
        }
        if f.max_jitter_ms.is_some_and(|max| t.jitter_ms > max) {
            return false;
        }
        true
    }
}

/// Min-max scale over one metric in the candidate set.
struct Scale {
    min: f64,
    max: f64,
}

impl Scale {
    fn over(values: impl Iterator<Item = f64>) -> Self {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values {
            min = min.min(v);
            max = max.max(v);
        }
        Self { min, max }
    }

    /// Normalizes so the smallest value scores 1.0. A degenerate set
    /// (all equal) scores everyone 1.0.
    fn smaller_is_better(&self, v: f64) -> f64 {
        if self.max <= self.min {
            return 1.0;
        }
        (self.max - v) / (self.max - self.min)
    }

    /// Normalizes so the largest value scores 1.0.
    fn larger_is_better(&self, v: f64) -> f64 {
        if self.max <= self.min {
            return 1.0;
        }
        (v - self.min) / (self.max - self.min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{HardFilter, ScoreWeights, SpawnRules};

    fn telemetry(latency: f64, price: f64) -> Telemetry {
        Telemetry {
            latency_ms: latency,
            price_per_gb: price,
            reputation: 1.0,
            ..Telemetry::default()
        }
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_permissive_always_allows() {
        let policy = Policy::permissive();
        let spec = VmSpawnRequest {
            cores: 4096,
            ..VmSpawnRequest::default()
        };
        assert!(policy.can_spawn(&spec).is_allowed());
    }

    #[test]
    fn test_enforce_denies_with_reason() {
        let policy = Policy {
            mode: PolicyMode::Enforce,
            rules: SpawnRules {
                max_cores: Some(4),
                ..SpawnRules::default()
            },
            ..Policy::default()
        };
        let spec = VmSpawnRequest {
            cores: 8,
            ..VmSpawnRequest::default()
        };

        match policy.can_spawn(&spec) {
            Admission::Deny { reason } => assert!(reason.contains("8 cores")),
            Admission::Allow => panic!("expected denial"),
        }
    }

    #[test]
    fn test_image_prefix_rule() {
        let policy = Policy {
            mode: PolicyMode::Enforce,
            rules: SpawnRules {
                allowed_image_prefixes: vec!["registry.internal/".to_string()],
                ..SpawnRules::default()
            },
            ..Policy::default()
        };

        let ok = VmSpawnRequest {
            image_ref: "registry.internal/nginx".to_string(),
            ..VmSpawnRequest::default()
        };
        let bad = VmSpawnRequest {
            image_ref: "docker.io/nginx".to_string(),
            ..VmSpawnRequest::default()
        };

        assert!(policy.can_spawn(&ok).is_allowed());
        assert!(!policy.can_spawn(&bad).is_allowed());
    }

    #[test]
    fn test_low_latency_preferred() {
        // Node A: latency 50, price 0.01. Node B: latency 10, price 0.05.
        // With weights {1,0,0,0} the coordinator must pick B.
        let policy = Policy {
            mode: PolicyMode::Enforce,
            weights: ScoreWeights {
                latency: 1.0,
                price: 0.0,
                reputation: 0.0,
                queue_depth: 0.0,
            },
            ..Policy::default()
        };

        let telemetry: HashMap<_, _> = [
            ("node-a".to_string(), telemetry(50.0, 0.01)),
            ("node-b".to_string(), telemetry(10.0, 0.05)),
        ]
        .into();

        let ranked = policy.select_nodes(&names(&["node-a", "node-b"]), &telemetry);
        assert_eq!(ranked, names(&["node-b", "node-a"]));
    }

    #[test]
    fn test_price_weight_flips_ranking() {
        let policy = Policy {
            weights: ScoreWeights {
                latency: 0.0,
                price: 1.0,
                reputation: 0.0,
                queue_depth: 0.0,
            },
            ..Policy::default()
        };

        let telemetry: HashMap<_, _> = [
            ("node-a".to_string(), telemetry(50.0, 0.01)),
            ("node-b".to_string(), telemetry(10.0, 0.05)),
        ]
        .into();

        let ranked = policy.select_nodes(&names(&["node-a", "node-b"]), &telemetry);
        assert_eq!(ranked, names(&["node-a", "node-b"]));
    }

    #[test]
    fn test_enforce_drops_filter_violations() {
        let policy = Policy {
            mode: PolicyMode::Enforce,
            filter: HardFilter {
                max_latency_ms: Some(20.0),
                ..HardFilter::default()
            },
            ..Policy::default()
        };

        let telemetry: HashMap<_, _> = [
            ("slow".to_string(), telemetry(50.0, 0.01)),
            ("fast".to_string(), telemetry(10.0, 0.05)),
        ]
        .into();

        let ranked = policy.select_nodes(&names(&["slow", "fast"]), &telemetry);
        assert_eq!(ranked, names(&["fast"]));
    }

    #[test]
    fn test_enforce_requires_capabilities() {
        let policy = Policy {
            mode: PolicyMode::Enforce,
            filter: HardFilter {
                required_capabilities: vec!["cuda".to_string()],
                ..HardFilter::default()
            },
            ..Policy::default()
        };

        let mut with_gpu = telemetry(10.0, 0.01);
        with_gpu.capabilities = vec!["cuda".to_string()];
        let telemetry: HashMap<_, _> = [
            ("gpu".to_string(), with_gpu),
            ("cpu".to_string(), telemetry(5.0, 0.01)),
        ]
        .into();

        let ranked = policy.select_nodes(&names(&["gpu", "cpu"]), &telemetry);
        assert_eq!(ranked, names(&["gpu"]));
    }

    #[test]
    fn test_enforce_drops_members_without_telemetry() {
        let policy = Policy {
            mode: PolicyMode::Enforce,
            ..Policy::default()
        };

        let telemetry: HashMap<_, _> = [("known".to_string(), telemetry(10.0, 0.01))].into();
        let ranked = policy.select_nodes(&names(&["known", "silent"]), &telemetry);
        assert_eq!(ranked, names(&["known"]));
    }

    #[test]
    fn test_permissive_scores_members_without_telemetry() {
        let policy = Policy::permissive();
        let telemetry = HashMap::new();
        let ranked = policy.select_nodes(&names(&["b", "a"]), &telemetry);
        // All score equally; lexicographic tie-break.
        assert_eq!(ranked, names(&["a", "b"]));
    }

    #[test]
    fn test_tie_break_is_lexicographic() {
        let policy = Policy::permissive();
        let telemetry: HashMap<_, _> = [
            ("zeta".to_string(), telemetry(10.0, 0.01)),
            ("alpha".to_string(), telemetry(10.0, 0.01)),
        ]
        .into();

        let ranked = policy.select_nodes(&names(&["zeta", "alpha"]), &telemetry);
        assert_eq!(ranked, names(&["alpha", "zeta"]));
    }

    #[test]
    fn test_empty_candidate_set() {
        let policy = Policy {
            mode: PolicyMode::Enforce,
            ..Policy::default()
        };
        assert!(policy.select_nodes(&[], &HashMap::new()).is_empty());
        assert!(
            policy
                .select_nodes(&names(&["silent"]), &HashMap::new())
                .is_empty()
        );
    }
}
