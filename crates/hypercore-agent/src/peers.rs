//! Peer-state bookkeeping.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use hypercore_state::Reassembler;
use hypercore_wire::NodeStateResponse;

/// Latest reassembled state received from one peer.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    /// The peer's advertised state.
    pub state: NodeStateResponse,

    /// The peer's host address, resolved from the bus at receive time.
    pub host: Option<IpAddr>,

    /// When the state arrived. Drives 3T eviction.
    pub received_at: Instant,
}

/// Everything guarded by the last-state mutex: the self view, the peer
/// map, and the in-progress fragment accumulator.
#[derive(Debug, Default)]
pub(crate) struct LastState {
    pub self_state: Option<NodeStateResponse>,
    pub peers: HashMap<String, PeerRecord>,
    pub reassembler: Reassembler,
}

impl LastState {
    /// Upserts a peer record. Digests apply in receive order; the
    /// timestamp always moves forward to now.
    pub fn upsert_peer(&mut self, state: NodeStateResponse, host: Option<IpAddr>) {
        self.peers.insert(
            state.node.id.clone(),
            PeerRecord {
                state,
                host,
                received_at: Instant::now(),
            },
        );
    }

    /// Removes and returns peers silent for longer than `max_age`.
    pub fn evict_stale(&mut self, max_age: Duration) -> Vec<PeerRecord> {
        let stale: Vec<String> = self
            .peers
            .iter()
            .filter(|(_, record)| record.received_at.elapsed() > max_age)
            .map(|(id, _)| id.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|id| self.peers.remove(&id))
            .collect()
    }

    /// True when any known state (self or peer) contains the workload.
    pub fn knows_workload(&self, id: &str) -> bool {
        let in_self = self
            .self_state
            .as_ref()
            .is_some_and(|s| s.workloads.iter().any(|w| w.id == id));
        in_self
            || self
                .peers
                .values()
                .any(|record| record.state.workloads.iter().any(|w| w.id == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hypercore_types::VmSpawnRequest;
    use hypercore_wire::{NodeRef, WorkloadState};

    fn state(node: &str, workload_ids: &[&str]) -> NodeStateResponse {
        NodeStateResponse {
            node: NodeRef {
                id: node.to_string(),
                fragment_key: String::new(),
            },
            workloads: workload_ids
                .iter()
                .map(|id| WorkloadState {
                    id: (*id).to_string(),
                    source: VmSpawnRequest::default(),
                    ports: vec![],
                })
                .collect(),
            beacon: None,
        }
    }

    #[test]
    fn test_upsert_replaces() {
        let mut last = LastState::default();
        last.upsert_peer(state("p1", &["a"]), None);
        last.upsert_peer(state("p1", &["b"]), None);

        assert_eq!(last.peers.len(), 1);
        assert_eq!(last.peers["p1"].state.workloads[0].id, "b");
    }

    #[test]
    fn test_evict_stale_removes_only_old() {
        let mut last = LastState::default();
        last.upsert_peer(state("old", &[]), None);
        last.peers.get_mut("old").unwrap().received_at =
            Instant::now() - Duration::from_secs(60);
        last.upsert_peer(state("fresh", &[]), None);

        let evicted = last.evict_stale(Duration::from_secs(15));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].state.node.id, "old");
        assert!(last.peers.contains_key("fresh"));
    }

    #[test]
    fn test_knows_workload_searches_self_and_peers() {
        let mut last = LastState::default();
        last.self_state = Some(state("self", &["mine"]));
        last.upsert_peer(state("p1", &["theirs"]), None);

        assert!(last.knows_workload("mine"));
        assert!(last.knows_workload("theirs"));
        assert!(!last.knows_workload("nowhere"));
    }
}
