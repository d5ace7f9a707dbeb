//! Coordinator-side spawn and stop protocols.

use tracing::{debug, info, warn};

use hypercore_gossip::QueryParams;
use hypercore_policy::Admission;
use hypercore_types::VmSpawnRequest;
use hypercore_wire::{CLUSTER_QUERY, ClusterMessage, NodeRef, VmSpawnResponse, VmStopRequest};

use crate::agent::Agent;
use crate::error::{AgentError, Result};

impl Agent {
    /// Drives a client spawn through the two-phase protocol.
    ///
    /// Policy admission first, then candidate ranking; an empty ranking
    /// falls back to a broadcast dry-run probe. Candidates get a commit
    /// query in order until one succeeds. A peer's ERROR envelope moves
    /// on to the next candidate; total silence becomes
    /// [`AgentError::NoResponse`].
    pub async fn spawn_workload(&self, spec: VmSpawnRequest) -> Result<VmSpawnResponse> {
        let mut spec = spec;
        spec.dry_run = false;

        if let Admission::Deny { reason } = self.policy.can_spawn(&spec) {
            return Err(AgentError::AdmissionRejected(reason));
        }

        let alive: Vec<String> = self
            .bus
            .members()
            .into_iter()
            .filter(|m| m.status == hypercore_gossip::MemberStatus::Alive)
            .map(|m| m.name)
            .collect();

        let ranked = self.policy.select_nodes(&alive, &self.telemetry_map());
        let candidates = if ranked.is_empty() {
            debug!("no ranked candidates, falling back to broadcast admission");
            self.probe_candidates(&spec).await?
        } else {
            ranked
        };

        if candidates.is_empty() {
            return Err(AgentError::NoResponse);
        }

        let payload = ClusterMessage::SpawnRequest(spec).encode()?;
        let mut last_peer_error: Option<AgentError> = None;

        for candidate in candidates {
            debug!(%candidate, "issuing spawn commit");
            let mut responses = self.bus.query(
                CLUSTER_QUERY,
                payload.clone(),
                QueryParams::to_node(candidate.as_str()).with_timeout(self.config.commit_timeout),
            );

            match responses.recv().await {
                Some(response) => match ClusterMessage::decode(&response.payload) {
                    Ok(ClusterMessage::SpawnResponse(spawned)) => {
                        info!(workload = %spawned.id, node = %candidate, "spawn committed");
                        return Ok(spawned);
                    }
                    Ok(ClusterMessage::Error(e)) => {
                        warn!(%candidate, error = %e.error, "commit rejected, trying next");
                        last_peer_error = Some(AgentError::Peer(e.error));
                    }
                    Ok(other) => {
                        warn!(%candidate, kind = %other.kind(), "unexpected commit response");
                    }
                    Err(e) => {
                        warn!(%candidate, error = %e, "undecodable commit response");
                    }
                },
                None => {
                    warn!(%candidate, "no commit response before deadline");
                }
            }
        }

        Err(last_peer_error.unwrap_or(AgentError::NoResponse))
    }

    /// Broadcast dry-run admission: every responder is a candidate, in
    /// arrival order.
    async fn probe_candidates(&self, spec: &VmSpawnRequest) -> Result<Vec<String>> {
        let mut probe = spec.clone();
        probe.dry_run = true;

        let payload = ClusterMessage::SpawnRequest(probe).encode()?;
        let mut responses = self.bus.query(
            CLUSTER_QUERY,
            payload,
            QueryParams::default().with_timeout(self.config.probe_timeout),
        );

        let mut responders = Vec::new();
        while let Some(response) = responses.recv().await {
            match ClusterMessage::decode(&response.payload) {
                Ok(ClusterMessage::SpawnResponse(_)) => responders.push(response.from),
                Ok(ClusterMessage::Error(e)) => {
                    debug!(node = %response.from, error = %e.error, "probe declined");
                }
                Ok(_) | Err(_) => {
                    debug!(node = %response.from, "ignoring malformed probe response");
                }
            }
        }

        Ok(responders)
    }

    /// Broadcast stop: the first non-error response wins. Non-owners
    /// answer with unknown-id errors, which are skipped.
    pub async fn stop_workload(&self, id: &str) -> Result<NodeRef> {
        let payload = ClusterMessage::StopRequest(VmStopRequest { id: id.to_string() }).encode()?;
        let mut responses = self.bus.query(
            CLUSTER_QUERY,
            payload,
            QueryParams::default().with_timeout(self.config.commit_timeout),
        );

        while let Some(response) = responses.recv().await {
            match ClusterMessage::decode(&response.payload) {
                Ok(ClusterMessage::NodeState(state)) => {
                    info!(workload = %id, owner = %state.node.id, "workload stopped");
                    return Ok(state.node);
                }
                Ok(ClusterMessage::Error(e)) => {
                    debug!(node = %response.from, error = %e.error, "stop declined");
                }
                Ok(_) | Err(_) => {
                    debug!(node = %response.from, "ignoring malformed stop response");
                }
            }
        }

        Err(AgentError::WorkloadNotFound(id.to_string()))
    }
}
