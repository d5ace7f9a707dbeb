//! Digest hashing and fragmentation.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use hypercore_types::Telemetry;
use hypercore_wire::{FragmentKey, FragmentKind, NodeRef, NodeStateResponse, WorkloadState};

/// Workloads per fragment.
pub const BATCH_SIZE: usize = 10;

/// Computes the digest hash of a workload set.
///
/// SHA-256 of `"<count>:<sorted,comma-joined ids>"`, hex-encoded. The
/// hash is order-independent over workloads, stable across process
/// restarts for the same set, and the empty set produces a distinguished
/// non-empty digest (the hash of `"0:"`).
pub fn state_hash<S: AsRef<str>>(workload_ids: &[S]) -> String {
    let mut ids: Vec<&str> = workload_ids.iter().map(AsRef::as_ref).collect();
    ids.sort_unstable();

    let preimage = format!("{}:{}", ids.len(), ids.join(","));
    let digest = Sha256::digest(preimage.as_bytes());

    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Splits a node's state into broadcastable fragments.
///
/// A digest of at most [`BATCH_SIZE`] workloads becomes one `complete`
/// fragment; anything larger becomes `begin, part*, finish` under one
/// fresh UUID. Every fragment carries the telemetry beacon so losing a
/// middle fragment still leaves stale-but-usable data.
pub fn fragment(
    node_id: &str,
    workloads: Vec<WorkloadState>,
    beacon: Option<Telemetry>,
) -> Vec<NodeStateResponse> {
    let key_id = Uuid::new_v4();

    if workloads.len() <= BATCH_SIZE {
        return vec![NodeStateResponse {
            node: NodeRef {
                id: node_id.to_string(),
                fragment_key: FragmentKey::new(key_id, FragmentKind::Complete).to_string(),
            },
            workloads,
            beacon,
        }];
    }

    let chunks: Vec<Vec<WorkloadState>> = workloads
        .chunks(BATCH_SIZE)
        .map(<[WorkloadState]>::to_vec)
        .collect();
    let last = chunks.len() - 1;

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let kind = if i == 0 {
                FragmentKind::Begin
            } else if i == last {
                FragmentKind::Finish
            } else {
                FragmentKind::Part
            };
            NodeStateResponse {
                node: NodeRef {
                    id: node_id.to_string(),
                    fragment_key: FragmentKey::new(key_id, kind).to_string(),
                },
                workloads: chunk,
                beacon: beacon.clone(),
            }
        })
        .collect()
}
