//! The agent event loop: single consumer of the bus inbound channel.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use hypercore_gossip::InboundEvent;
use hypercore_wire::{
    CLUSTER_QUERY, ClusterMessage, NodeRef, NodeStateResponse, STATE_BROADCAST_EVENT,
    VmSpawnResponse,
};

use crate::agent::Agent;

/// Starts the event loop task.
pub(crate) fn spawn(agent: Arc<Agent>) {
    let events = agent.bus.events();
    tokio::spawn(async move {
        loop {
            let event = events.recv().await;
            handle_event(&agent, event).await;
        }
    });
}

async fn handle_event(agent: &Arc<Agent>, event: InboundEvent) {
    match event {
        InboundEvent::MemberJoin(member) => {
            info!(member = %member.name, addr = %member.addr, "member joined");
        }
        InboundEvent::MemberLeave(member) => {
            info!(member = %member.name, "member left");
        }
        InboundEvent::MemberFailed(member) => {
            warn!(member = %member.name, "member failed");
        }
        InboundEvent::MemberUpdate(member) => {
            debug!(member = %member.name, "member updated");
        }
        InboundEvent::MemberReap(member) => {
            debug!(member = %member.name, "member reaped");
        }
        InboundEvent::Query {
            from,
            name,
            payload,
            handle,
        } => {
            if name != CLUSTER_QUERY {
                warn!(%name, %from, "dropping query with unknown name");
                return;
            }
            let message = match ClusterMessage::decode(&payload) {
                Ok(message) => message,
                Err(e) => {
                    warn!(%from, error = %e, "dropping undecodable query");
                    return;
                }
            };
            // Every handler failure still answers, as an ERROR envelope.
            if let Some(response) = dispatch_query(agent, &from, message).await {
                match response.encode() {
                    Ok(bytes) => handle.respond(bytes),
                    Err(e) => warn!(error = %e, "response encoding failed"),
                }
            }
        }
        InboundEvent::UserEvent {
            from,
            name,
            payload,
        } => {
            if name != STATE_BROADCAST_EVENT {
                debug!(%name, %from, "ignoring unknown user event");
                return;
            }
            handle_state_broadcast(agent, &from, &payload).await;
        }
    }
}

/// Dispatches one query envelope. `None` means a protocol error: the
/// handle is dropped and the querier sees no response.
async fn dispatch_query(
    agent: &Arc<Agent>,
    from: &str,
    message: ClusterMessage,
) -> Option<ClusterMessage> {
    match message {
        ClusterMessage::SpawnRequest(spec) => {
            if spec.dry_run {
                // Admission probe: answer immediately.
                return Some(ClusterMessage::SpawnResponse(VmSpawnResponse::dry_run_ack()));
            }
            match agent.execute_local_spawn(&spec).await {
                Ok(id) => {
                    let url = agent.identity.virtual_host(&id);
                    Some(ClusterMessage::SpawnResponse(VmSpawnResponse { id, url }))
                }
                Err(e) => {
                    warn!(%from, error = %e, "local spawn failed");
                    Some(ClusterMessage::error(e.to_string()))
                }
            }
        }
        ClusterMessage::StopRequest(request) => {
            match agent.runtime.delete(&request.id).await {
                Ok(exit_code) => {
                    info!(workload = %request.id, exit_code, "workload stopped");
                    Some(ClusterMessage::NodeState(NodeStateResponse {
                        node: NodeRef {
                            id: agent.identity.name(),
                            fragment_key: String::new(),
                        },
                        workloads: vec![],
                        beacon: None,
                    }))
                }
                Err(e) => Some(ClusterMessage::error(e.to_string())),
            }
        }
        ClusterMessage::NodeState(_) => match agent.build_self_state().await {
            Ok(state) => Some(ClusterMessage::NodeState(state)),
            Err(e) => Some(ClusterMessage::error(e.to_string())),
        },
        ClusterMessage::SpawnResponse(_) | ClusterMessage::Error(_) => {
            warn!(%from, kind = %message.kind(), "dropping non-request envelope");
            None
        }
    }
}

/// Feeds a state-broadcast fragment through reassembly and, on
/// completion, updates the peer record and registers ingress routes.
async fn handle_state_broadcast(agent: &Arc<Agent>, from: &str, payload: &Bytes) {
    let fragment: NodeStateResponse = match postcard::from_bytes(payload) {
        Ok(fragment) => fragment,
        Err(e) => {
            warn!(%from, error = %e, "dropping undecodable state broadcast");
            return;
        }
    };

    if fragment.node.id == agent.identity.name() {
        // The self view is authoritative over any echo.
        return;
    }

    // Resolve the peer's host before taking the state lock.
    let host: Option<IpAddr> = agent
        .bus
        .members()
        .into_iter()
        .find(|m| m.name == fragment.node.id)
        .map(|m| m.addr.ip());

    let registrations: Vec<(u16, String, SocketAddr)> = {
        let mut last = agent.last_state.lock().expect("last-state poisoned");
        let Some(complete) = last.reassembler.accept(fragment) else {
            return;
        };

        debug!(
            peer = %complete.node.id,
            workloads = complete.workloads.len(),
            "peer state updated"
        );

        let routes = match host {
            Some(ip) => complete
                .workloads
                .iter()
                .flat_map(|workload| {
                    workload.source.ports.iter().map(|(host_port, container_port)| {
                        (
                            *host_port as u16,
                            workload.id.clone(),
                            SocketAddr::new(ip, *container_port as u16),
                        )
                    })
                })
                .collect(),
            None => {
                warn!(peer = %complete.node.id, "peer host unknown, skipping ingress");
                Vec::new()
            }
        };

        last.upsert_peer(complete, host);
        routes
    };

    for (host_port, workload_id, target) in registrations {
        if let Err(e) = agent.proxy.register(host_port, &workload_id, target).await {
            warn!(host_port, workload = %workload_id, error = %e, "ingress registration failed");
        }
    }
}
