//! The cluster RPC envelope and payload types.
//!
//! All RPC payloads share the [`ClusterMessage`] envelope; its variant is
//! the event kind. Spawn carries a request on the probe/commit path and a
//! response on the way back; a stop is acknowledged with the responder's
//! node-state envelope carrying no workloads.

use std::fmt::Display;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use hypercore_types::{Telemetry, VmSpawnRequest};

use crate::error::Result;
use crate::frame::Frame;

// ============================================================================
// Envelope
// ============================================================================

/// Event kind carried by a [`ClusterMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Error,
    Spawn,
    Stop,
    NodeState,
}

impl Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Error => "ERROR",
            Self::Spawn => "SPAWN",
            Self::Stop => "STOP",
            Self::NodeState => "NODE_STATE",
        };
        write!(f, "{s}")
    }
}

/// The typed wrapper shared by all cluster RPC payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClusterMessage {
    /// Failure reason, free text.
    Error(ErrorResponse),

    /// Spawn probe or commit.
    SpawnRequest(VmSpawnRequest),

    /// Successful spawn; empty on a dry-run probe.
    SpawnResponse(VmSpawnResponse),

    /// Stop by workload id.
    StopRequest(VmStopRequest),

    /// A node's state: digest broadcast fragments, node-state query
    /// responses, and stop acknowledgements.
    NodeState(NodeStateResponse),
}

impl ClusterMessage {
    /// The event kind of this envelope.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Error(_) => EventKind::Error,
            Self::SpawnRequest(_) | Self::SpawnResponse(_) => EventKind::Spawn,
            Self::StopRequest(_) => EventKind::Stop,
            Self::NodeState(_) => EventKind::NodeState,
        }
    }

    /// Wraps a free-text failure reason.
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error(ErrorResponse {
            error: reason.into(),
        })
    }

    /// Encodes the envelope to its postcard bytes.
    pub fn encode(&self) -> Result<Bytes> {
        Ok(postcard::to_allocvec(self)?.into())
    }

    /// Decodes an envelope from postcard bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(postcard::from_bytes(bytes)?)
    }

    /// Encodes the envelope into a transport frame.
    pub fn to_frame(&self) -> Result<Frame> {
        Frame::new(self.encode()?)
    }

    /// Decodes an envelope out of a transport frame.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        Self::decode(&frame.payload)
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Free-text failure carried in an [`EventKind::Error`] envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Successful spawn result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmSpawnResponse {
    /// Runtime-assigned workload id.
    pub id: String,

    /// Virtual URL, `<id>.<base-url>`.
    pub url: String,
}

impl VmSpawnResponse {
    /// The empty success envelope returned for a dry-run probe.
    pub fn dry_run_ack() -> Self {
        Self::default()
    }
}

/// Stop a workload by id; any node may receive it, only the owner acts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmStopRequest {
    pub id: String,
}

/// Reference to the emitting node inside a state message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    /// Node id (UUID string).
    pub id: String,

    /// Fragment key, `<uuid>_<kind>`, set on digest broadcasts. Empty on
    /// direct responses, which are never fragmented.
    #[serde(default)]
    pub fragment_key: String,
}

/// One workload inside a node-state message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadState {
    /// Runtime-assigned workload id.
    pub id: String,

    /// The original spawn descriptor, echoed verbatim.
    pub source: VmSpawnRequest,

    /// Host ports the workload exposes.
    #[serde(default)]
    pub ports: Vec<u32>,
}

/// A node's advertised state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStateResponse {
    /// The emitting node.
    pub node: NodeRef,

    /// Workloads this node runs (one fragment's worth during broadcast).
    pub workloads: Vec<WorkloadState>,

    /// Telemetry beacon; repeated on every fragment so losing a middle
    /// fragment still leaves usable data.
    pub beacon: Option<Telemetry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn sample_spec() -> VmSpawnRequest {
        VmSpawnRequest {
            cores: 2,
            memory_mib: 1024,
            image_ref: "nginx:latest".to_string(),
            ports: [(80u32, 8080u32)].into_iter().collect(),
            env: vec!["MODE=prod".to_string()],
            dry_run: false,
        }
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ClusterMessage::error("x").kind(), EventKind::Error);
        assert_eq!(
            ClusterMessage::SpawnRequest(sample_spec()).kind(),
            EventKind::Spawn
        );
        assert_eq!(
            ClusterMessage::SpawnResponse(VmSpawnResponse::default()).kind(),
            EventKind::Spawn
        );
        assert_eq!(
            ClusterMessage::StopRequest(VmStopRequest { id: "a".into() }).kind(),
            EventKind::Stop
        );
        assert_eq!(
            ClusterMessage::NodeState(NodeStateResponse::default()).kind(),
            EventKind::NodeState
        );
    }

    #[test]
    fn test_envelope_round_trip() {
        let msg = ClusterMessage::SpawnRequest(sample_spec());
        let decoded = ClusterMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_envelope_through_frame() {
        let msg = ClusterMessage::NodeState(NodeStateResponse {
            node: NodeRef {
                id: "node-1".to_string(),
                fragment_key: String::new(),
            },
            workloads: vec![WorkloadState {
                id: "w1".to_string(),
                source: sample_spec(),
                ports: vec![80],
            }],
            beacon: Some(Telemetry::default()),
        });

        let mut buf = BytesMut::new();
        msg.to_frame().unwrap().encode(&mut buf);

        let frame = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(ClusterMessage::from_frame(&frame).unwrap(), msg);
    }

    #[test]
    fn test_dry_run_ack_is_empty() {
        let ack = VmSpawnResponse::dry_run_ack();
        assert!(ack.id.is_empty());
        assert!(ack.url.is_empty());
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(ClusterMessage::decode(&[0xff, 0xfe, 0xfd]).is_err());
    }
}
