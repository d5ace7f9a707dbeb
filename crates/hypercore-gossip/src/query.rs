//! Query/response RPC over the bus.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;

/// Parameters for one fan-out query.
#[derive(Debug, Clone)]
pub struct QueryParams {
    /// Per-member exchange deadline.
    pub timeout: Duration,

    /// Restrict the fan-out to these member names. `None` targets every
    /// alive member, self included.
    pub filter_nodes: Option<Vec<String>>,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(90),
            filter_nodes: None,
        }
    }
}

impl QueryParams {
    /// Params targeting a single member.
    pub fn to_node(name: impl Into<String>) -> Self {
        Self {
            filter_nodes: Some(vec![name.into()]),
            ..Self::default()
        }
    }

    /// Overrides the exchange deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// One member's answer to a query.
#[derive(Debug)]
pub struct NodeResponse {
    /// Name of the responding member.
    pub from: String,

    /// Opaque response payload.
    pub payload: Bytes,
}

/// Handle for answering an inbound query.
///
/// Each query is answered at most once; dropping the handle unanswered
/// closes the exchange and the querier sees no response from this node.
#[derive(Debug)]
pub struct QueryHandle {
    reply: oneshot::Sender<Bytes>,
}

impl QueryHandle {
    pub(crate) fn new() -> (Self, oneshot::Receiver<Bytes>) {
        let (reply, rx) = oneshot::channel();
        (Self { reply }, rx)
    }

    /// Sends the response payload back to the querier.
    pub fn respond(self, payload: Bytes) {
        // The querier may have timed out and gone; nothing to do then.
        let _ = self.reply.send(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_node_params() {
        let params = QueryParams::to_node("n1");
        assert_eq!(params.filter_nodes, Some(vec!["n1".to_string()]));
        assert_eq!(params.timeout, Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_handle_round_trip() {
        let (handle, rx) = QueryHandle::new();
        handle.respond(Bytes::from_static(b"ok"));
        assert_eq!(rx.await.unwrap(), Bytes::from_static(b"ok"));
    }

    #[tokio::test]
    async fn test_dropped_handle_closes_exchange() {
        let (handle, rx) = QueryHandle::new();
        drop(handle);
        assert!(rx.await.is_err());
    }
}
