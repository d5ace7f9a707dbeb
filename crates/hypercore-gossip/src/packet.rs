//! Datagram and query-stream packet types.
//!
//! UDP datagrams carry bare postcard-encoded [`Packet`]s. The TCP query
//! transport exchanges one [`QueryFrame`] and at most one
//! [`ResponseFrame`], each postcard-encoded inside a length-prefixed
//! `hypercore_wire::Frame`.

use serde::{Deserialize, Serialize};

use crate::member::Member;

/// A gossip datagram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum Packet {
    /// Periodic liveness announcement with a member-list sample.
    Heartbeat {
        from: String,
        members: Vec<Member>,
    },

    /// Reply to a heartbeat; keeps pairwise freshness symmetric.
    HeartbeatAck {
        from: String,
        members: Vec<Member>,
    },

    /// Graceful departure.
    Leave { from: String },

    /// Best-effort multicast user event.
    UserEvent {
        from: String,
        name: String,
        payload: Vec<u8>,
    },
}

impl Packet {
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

/// Client → server half of one query exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct QueryFrame {
    pub from: String,
    pub name: String,
    pub payload: Vec<u8>,
}

/// Server → client half of one query exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ResponseFrame {
    pub from: String,
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::MemberStatus;

    #[test]
    fn test_packet_round_trip() {
        let packet = Packet::Heartbeat {
            from: "n1".to_string(),
            members: vec![Member {
                name: "n2".to_string(),
                addr: "10.0.0.2:7946".parse().unwrap(),
                status: MemberStatus::Alive,
            }],
        };

        let bytes = packet.encode().unwrap();
        let decoded = Packet::decode(&bytes).unwrap();
        assert!(matches!(decoded, Packet::Heartbeat { from, members }
            if from == "n1" && members.len() == 1));
    }

    #[test]
    fn test_user_event_round_trip() {
        let packet = Packet::UserEvent {
            from: "n1".to_string(),
            name: "hypercore_state_broadcast".to_string(),
            payload: vec![1, 2, 3],
        };

        let bytes = packet.encode().unwrap();
        assert!(matches!(Packet::decode(&bytes).unwrap(),
            Packet::UserEvent { payload, .. } if payload == vec![1, 2, 3]));
    }
}
