//! Fragment reassembly.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::warn;
use uuid::Uuid;

use hypercore_wire::{FragmentKey, FragmentKind, NodeStateResponse};

/// Accumulators older than this are discarded; their `finish` was lost.
const STALE_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Accumulator {
    fragments: Vec<NodeStateResponse>,
    started: Instant,
}

/// Rebuilds fragmented digests, keyed by fragment UUID.
///
/// An explicit accumulator rather than anything resumable: fragments
/// arrive interleaved across peers and the event loop owns the state.
#[derive(Debug, Default)]
pub struct Reassembler {
    partial: HashMap<Uuid, Accumulator>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one received fragment.
    ///
    /// Returns the fully reassembled state on `complete` or `finish`.
    /// Stray fragments (bad key, `part`/`finish` with no `begin`) are
    /// dropped with a warning.
    pub fn accept(&mut self, fragment: NodeStateResponse) -> Option<NodeStateResponse> {
        self.purge_stale();

        let key = match FragmentKey::parse(&fragment.node.fragment_key) {
            Ok(key) => key,
            Err(e) => {
                warn!(node = %fragment.node.id, error = %e, "dropping fragment with bad key");
                return None;
            }
        };

        match key.kind {
            FragmentKind::Complete => Some(merge(vec![fragment])),
            FragmentKind::Begin => {
                if self.partial.contains_key(&key.id) {
                    warn!(key = %key.id, "duplicate begin fragment, restarting accumulator");
                }
                self.partial.insert(
                    key.id,
                    Accumulator {
                        fragments: vec![fragment],
                        started: Instant::now(),
                    },
                );
                None
            }
            FragmentKind::Part => {
                match self.partial.get_mut(&key.id) {
                    Some(acc) => acc.fragments.push(fragment),
                    None => {
                        warn!(key = %key.id, "dropping stray part fragment");
                    }
                }
                None
            }
            FragmentKind::Finish => match self.partial.remove(&key.id) {
                Some(mut acc) => {
                    acc.fragments.push(fragment);
                    Some(merge(acc.fragments))
                }
                None => {
                    warn!(key = %key.id, "dropping stray finish fragment");
                    None
                }
            },
        }
    }

    /// Number of in-flight accumulators.
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    fn purge_stale(&mut self) {
        self.partial.retain(|key, acc| {
            let fresh = acc.started.elapsed() < STALE_AFTER;
            if !fresh {
                warn!(key = %key, "discarding stale fragment accumulator");
            }
            fresh
        });
    }
}

/// Merges fragments into one state: workloads concatenated in arrival
/// order, the beacon taken from the last fragment that carried one.
fn merge(fragments: Vec<NodeStateResponse>) -> NodeStateResponse {
    let mut merged = NodeStateResponse::default();

    for fragment in fragments {
        merged.node.id = fragment.node.id;
        merged.workloads.extend(fragment.workloads);
        if fragment.beacon.is_some() {
            merged.beacon = fragment.beacon;
        }
    }

    // The merged state is no longer a fragment.
    merged.node.fragment_key = String::new();
    merged
}
