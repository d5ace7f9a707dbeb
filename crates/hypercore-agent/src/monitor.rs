//! Monitor, liveness, and latency tasks.

use std::sync::Arc;
use std::time::Instant;

use tokio::net::TcpStream;
use tokio::time::{interval, timeout};
use tracing::{debug, info, warn};

use hypercore_runtime::TaskStatus;
use hypercore_state::fragment;
use hypercore_wire::{STATE_BROADCAST_EVENT, WorkloadState};

use crate::admission;
use crate::agent::Agent;
use crate::error::Result;

/// Starts the monitor task: reconcile, digest, broadcast-on-change.
/// The latency probe piggybacks on the same tick.
pub(crate) fn spawn_monitor(agent: Arc<Agent>) {
    tokio::spawn(async move {
        let mut tick = interval(agent.config.monitor_interval);
        loop {
            tick.tick().await;
            probe_peer_latency(&agent).await;
            if let Err(e) = monitor_pass(&agent).await {
                warn!(error = %e, "monitor pass failed");
            }
        }
    });
}

/// Starts the liveness task: evict peers silent past 3T and optionally
/// re-dispatch their workloads.
pub(crate) fn spawn_liveness(agent: Arc<Agent>) {
    tokio::spawn(async move {
        let mut tick = interval(agent.config.monitor_interval);
        loop {
            tick.tick().await;
            liveness_pass(&agent);
        }
    });
}

/// One reconciliation cycle.
async fn monitor_pass(agent: &Arc<Agent>) -> Result<()> {
    let tasks = agent.runtime.list().await?;

    for task in tasks {
        match task.status {
            TaskStatus::Stopped => {
                restart_stopped(agent, &task.id).await;
            }
            TaskStatus::Running => {
                let Ok(detail) = agent.runtime.get(&task.id).await else {
                    continue;
                };
                let Some(spec) = admission::stored_spec(&detail.labels) else {
                    debug!(workload = %task.id, "task has no stored descriptor, skipping");
                    continue;
                };

                // Idempotent re-registration repairs proxy state after
                // restarts and IP moves.
                if let Err(e) = agent.register_local_routes(&task.id, &spec).await {
                    warn!(workload = %task.id, error = %e, "route re-registration failed");
                }
            }
        }
    }

    let workloads = agent.live_workloads().await?;

    agent.metrics.workload_count.set(workloads.len() as i64);
    agent
        .metrics
        .queue_depth
        .set(agent.bus.queue_depth() as i64);

    let beacon = agent.beacon();

    // Refresh the self view every cycle; a node always appears in its
    // own latest digest.
    {
        let mut last = agent.last_state.lock().expect("last-state poisoned");
        last.self_state = Some(hypercore_wire::NodeStateResponse {
            node: hypercore_wire::NodeRef {
                id: agent.identity.name(),
                fragment_key: String::new(),
            },
            workloads: workloads.clone(),
            beacon: Some(beacon.clone()),
        });
    }

    let hash = Agent::hash_of(&workloads);
    let unchanged = {
        let last_hash = agent.last_hash.lock().expect("state-hash poisoned");
        *last_hash == hash
    };
    if unchanged {
        return Ok(());
    }

    // Broadcast gate: a deep outbound queue means the bus is unhealthy;
    // skip without consuming the change so the next cycle retries.
    let depth = agent.bus.queue_depth();
    if depth > agent.config.broadcast_ceiling() {
        agent.metrics.broadcast_skipped.inc();
        warn!(depth, ceiling = agent.config.broadcast_ceiling(), "broadcast gated");
        return Ok(());
    }

    {
        let mut last_hash = agent.last_hash.lock().expect("state-hash poisoned");
        *last_hash = hash;
    }
    agent.metrics.state_changes.inc();

    let fragments = fragment(&agent.identity.name(), workloads, Some(beacon));
    debug!(count = fragments.len(), "broadcasting state digest");
    for piece in fragments {
        let bytes = match postcard::to_allocvec(&piece) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "digest encoding failed");
                continue;
            }
        };
        if let Err(e) = agent
            .bus
            .broadcast_user_event(STATE_BROADCAST_EVENT, bytes.into())
        {
            warn!(error = %e, "digest broadcast failed");
        }
    }

    Ok(())
}

/// Deletes a stopped task and re-dispatches it from its stored
/// descriptor through the coordinator path.
async fn restart_stopped(agent: &Arc<Agent>, id: &str) {
    let spec = match agent.runtime.get(id).await {
        Ok(detail) => admission::stored_spec(&detail.labels),
        Err(e) => {
            debug!(workload = %id, error = %e, "stopped task already gone");
            None
        }
    };

    if let Err(e) = agent.runtime.delete(id).await {
        warn!(workload = %id, error = %e, "stopped task deletion failed");
    }

    let Some(spec) = spec else {
        return;
    };

    info!(workload = %id, "re-dispatching stopped workload");
    let agent = Arc::clone(agent);
    tokio::spawn(async move {
        match agent.spawn_workload(spec).await {
            Ok(response) => info!(workload = %response.id, "workload re-dispatched"),
            Err(e) => warn!(error = %e, "re-dispatch failed"),
        }
    });
}

/// One liveness sweep over the peer map.
fn liveness_pass(agent: &Arc<Agent>) {
    let evicted = {
        let mut last = agent.last_state.lock().expect("last-state poisoned");
        last.evict_stale(agent.config.eviction_after())
    };

    for record in evicted {
        warn!(
            peer = %record.state.node.id,
            workloads = record.state.workloads.len(),
            "evicting silent peer"
        );

        if !agent.config.respawn_on_node_failure {
            continue;
        }
        for workload in record.state.workloads {
            schedule_respawn(Arc::clone(agent), workload);
        }
    }
}

/// Re-dispatches one evicted workload after the grace period, unless the
/// owner recovered or an identical descriptor was already re-dispatched.
fn schedule_respawn(agent: Arc<Agent>, workload: WorkloadState) {
    tokio::spawn(async move {
        tokio::time::sleep(agent.config.respawn_grace).await;

        let reappeared = {
            let last = agent.last_state.lock().expect("last-state poisoned");
            last.knows_workload(&workload.id)
        };
        if reappeared {
            debug!(workload = %workload.id, "owner recovered, skipping re-dispatch");
            return;
        }

        if !claim_respawn(&agent, &workload.source.to_label_value()) {
            debug!(workload = %workload.id, "descriptor already re-dispatched");
            return;
        }

        info!(workload = %workload.id, "re-dispatching evicted workload");
        match agent.spawn_workload(workload.source).await {
            Ok(response) => info!(workload = %response.id, "evicted workload re-dispatched"),
            Err(e) => warn!(error = %e, "evicted workload re-dispatch failed"),
        }
    });
}

/// Claims a descriptor hash in the re-dispatch ledger. Entries expire
/// after five minutes.
fn claim_respawn(agent: &Agent, descriptor_json: &str) -> bool {
    use sha2::{Digest, Sha256};
    const LEDGER_TTL: std::time::Duration = std::time::Duration::from_secs(300);

    let digest = Sha256::digest(descriptor_json.as_bytes());
    let key = format!("{digest:x}");

    let mut ledger = agent.respawned.lock().expect("respawn ledger poisoned");
    ledger.retain(|_, at| at.elapsed() < LEDGER_TTL);
    if ledger.contains_key(&key) {
        return false;
    }
    ledger.insert(key, Instant::now());
    true
}

/// TCP-connects to each alive peer's RPC port within the probe budget
/// and feeds the sample ring.
async fn probe_peer_latency(agent: &Arc<Agent>) {
    let peers: Vec<_> = agent
        .bus
        .members()
        .into_iter()
        .filter(|m| {
            m.name != agent.bus.node_name()
                && m.status == hypercore_gossip::MemberStatus::Alive
        })
        .collect();

    for peer in peers {
        let start = Instant::now();
        let sample = match timeout(
            agent.config.latency_probe_timeout,
            TcpStream::connect(peer.addr),
        )
        .await
        {
            Ok(Ok(_stream)) => Some(start.elapsed().as_secs_f64() * 1000.0),
            Ok(Err(_)) | Err(_) => None,
        };

        let mut ring = agent.latency.lock().expect("latency ring poisoned");
        ring.record(sample);
    }
}
