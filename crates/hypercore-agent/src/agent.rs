//! Agent construction and shared state.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use hypercore_gossip::GossipBus;
use hypercore_policy::Policy;
use hypercore_proxy::ServiceProxy;
use hypercore_runtime::{ContainerRuntime, ResourceLimits, TaskStatus};
use hypercore_state::state_hash;
use hypercore_types::{NodeIdentity, SPAWN_REQUEST_LABEL, Telemetry, VmSpawnRequest};
use hypercore_wire::{NodeRef, NodeStateResponse, WorkloadState};

use crate::admission;
use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::latency::LatencyRing;
use crate::metrics::Metrics;
use crate::peers::LastState;

/// Where a workload lives, from this node's view of cluster state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadHome {
    /// Running under the local runtime.
    Local,

    /// Advertised by a peer.
    Peer {
        node_id: String,
        host: Option<IpAddr>,
    },
}

/// The cluster agent.
///
/// Wired by pure dependency injection at construction; the proxy and
/// policy are leaves with no callbacks into the agent. Shared mutable
/// state is partitioned into three locks, acquired (when nested) in the
/// order proxy → last-state → state-hash, and never held across I/O.
pub struct Agent {
    pub(crate) identity: NodeIdentity,
    pub(crate) config: AgentConfig,
    pub(crate) runtime: Arc<dyn ContainerRuntime>,
    pub(crate) bus: Arc<GossipBus>,
    pub(crate) proxy: Arc<ServiceProxy>,
    pub(crate) policy: Policy,
    pub(crate) metrics: Metrics,

    pub(crate) last_state: Mutex<LastState>,
    pub(crate) last_hash: Mutex<String>,
    pub(crate) latency: Mutex<LatencyRing>,

    /// Descriptor hashes recently re-dispatched after a peer eviction.
    pub(crate) respawned: Mutex<std::collections::HashMap<String, std::time::Instant>>,
}

impl Agent {
    /// Builds an agent over its injected collaborators.
    pub fn new(
        identity: NodeIdentity,
        config: AgentConfig,
        runtime: Arc<dyn ContainerRuntime>,
        bus: Arc<GossipBus>,
        proxy: Arc<ServiceProxy>,
        policy: Policy,
    ) -> Arc<Self> {
        Arc::new(Self {
            identity,
            config,
            runtime,
            bus,
            proxy,
            policy,
            metrics: Metrics::new(),
            last_state: Mutex::new(LastState::default()),
            last_hash: Mutex::new(String::new()),
            latency: Mutex::new(LatencyRing::default()),
            respawned: Mutex::new(std::collections::HashMap::new()),
        })
    }

    /// Starts the event loop and the monitor/liveness tasks.
    pub fn run(self: &Arc<Self>) {
        info!(node = %self.identity, "agent starting");
        crate::event_loop::spawn(Arc::clone(self));
        crate::monitor::spawn_monitor(Arc::clone(self));
        crate::monitor::spawn_liveness(Arc::clone(self));
    }

    /// This node's identity.
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// The agent's metric set.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Concatenation of the self view and all peer states.
    pub fn cluster_state(&self) -> Vec<NodeStateResponse> {
        let last = self.last_state.lock().expect("last-state poisoned");
        let mut out = Vec::with_capacity(last.peers.len() + 1);
        if let Some(self_state) = &last.self_state {
            out.push(self_state.clone());
        }
        out.extend(last.peers.values().map(|record| record.state.clone()));
        out
    }

    /// Finds the node a workload lives on. The self view wins over any
    /// peer echo of the same id.
    pub fn locate_workload(&self, id: &str) -> Option<WorkloadHome> {
        let last = self.last_state.lock().expect("last-state poisoned");

        if let Some(self_state) = &last.self_state {
            if self_state.workloads.iter().any(|w| w.id == id) {
                return Some(WorkloadHome::Local);
            }
        }

        last.peers.values().find_map(|record| {
            record
                .state
                .workloads
                .iter()
                .any(|w| w.id == id)
                .then(|| WorkloadHome::Peer {
                    node_id: record.state.node.id.clone(),
                    host: record.host,
                })
        })
    }

    /// The log endpoint of the peer owning a workload, if any.
    pub fn peer_log_endpoint(&self, id: &str) -> Option<SocketAddr> {
        match self.locate_workload(id)? {
            WorkloadHome::Local => None,
            WorkloadHome::Peer { host, .. } => {
                host.map(|ip| SocketAddr::new(ip, self.config.log_service_port))
            }
        }
    }

    /// Path of a local workload's log file.
    pub fn local_log_path(&self, id: &str) -> PathBuf {
        self.config.log_dir.join(format!("{id}.log"))
    }

    /// Reads a local workload's log file.
    pub async fn read_local_log(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.local_log_path(id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AgentError::WorkloadNotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    // ------------------------------------------------------------------
    // Local execution (the target side of a committed spawn)
    // ------------------------------------------------------------------

    /// Admits and creates a workload on this node, registering its
    /// ingress routes. The descriptor is attached verbatim as a label.
    pub(crate) async fn execute_local_spawn(&self, spec: &VmSpawnRequest) -> Result<String> {
        admission::admit(self.runtime.as_ref(), spec, self.config.capacity_cores)
            .await
            .map_err(AgentError::AdmissionRejected)?;

        let capacity = admission::host_cores(self.config.capacity_cores);
        let limits = ResourceLimits {
            cpu_fraction: f64::from(spec.cores) / f64::from(capacity),
            memory_mib: spec.memory_mib,
        };
        let labels: BTreeMap<String, String> =
            [(SPAWN_REQUEST_LABEL.to_string(), spec.to_label_value())].into();

        let id = self.runtime.create(spec, labels, limits).await?;
        info!(workload = %id, image = %spec.image_ref, "workload created");

        if let Err(e) = self.register_local_routes(&id, spec).await {
            warn!(workload = %id, error = %e, "ingress registration failed");
        }

        Ok(id)
    }

    /// Registers every host port of a local workload in the proxy.
    pub(crate) async fn register_local_routes(
        &self,
        id: &str,
        spec: &VmSpawnRequest,
    ) -> Result<()> {
        if spec.ports.is_empty() {
            return Ok(());
        }

        let detail = self.runtime.get(id).await?;
        for (host_port, container_port) in &spec.ports {
            let target = SocketAddr::new(IpAddr::V4(detail.primary_ip), *container_port as u16);
            self.proxy
                .register(*host_port as u16, id, target)
                .await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Self state
    // ------------------------------------------------------------------

    /// Snapshot of live local workloads with their stored descriptors.
    /// Advertised ports come from the proxy's service table, so the
    /// digest reflects the ingress actually in place.
    pub(crate) async fn live_workloads(&self) -> Result<Vec<WorkloadState>> {
        let mut workloads = Vec::new();
        for task in self.runtime.list().await? {
            if task.status != TaskStatus::Running {
                continue;
            }
            let Ok(detail) = self.runtime.get(&task.id).await else {
                continue;
            };
            let Some(spec) = admission::stored_spec(&detail.labels) else {
                continue;
            };
            workloads.push(WorkloadState {
                id: task.id,
                source: spec,
                ports: vec![],
            });
        }

        let services = self.proxy.services();
        for workload in &mut workloads {
            if let Some(ports) = services.get(&workload.id) {
                workload.ports = ports.iter().map(|p| u32::from(*p)).collect();
            }
        }

        Ok(workloads)
    }

    /// The telemetry beacon advertised with every digest.
    pub(crate) fn beacon(&self) -> Telemetry {
        let (latency_ms, jitter_ms, packet_loss) = {
            let ring = self.latency.lock().expect("latency ring poisoned");
            (ring.mean_ms(), ring.jitter_ms(), ring.loss())
        };
        Telemetry {
            latency_ms,
            jitter_ms,
            packet_loss,
            queue_depth: self.bus.queue_depth(),
            price_per_gb: self.config.price_per_gb,
            reputation: self.config.reputation,
            capabilities: self.config.capabilities.clone(),
        }
    }

    /// Builds the current complete self state (no fragmentation).
    pub(crate) async fn build_self_state(&self) -> Result<NodeStateResponse> {
        Ok(NodeStateResponse {
            node: NodeRef {
                id: self.identity.name(),
                fragment_key: String::new(),
            },
            workloads: self.live_workloads().await?,
            beacon: Some(self.beacon()),
        })
    }

    /// Hash of the current local workload set.
    pub(crate) fn hash_of(workloads: &[WorkloadState]) -> String {
        let ids: Vec<&str> = workloads.iter().map(|w| w.id.as_str()).collect();
        state_hash(&ids)
    }

    /// Telemetry per node, self included, for candidate ranking.
    pub(crate) fn telemetry_map(&self) -> std::collections::HashMap<String, Telemetry> {
        let last = self.last_state.lock().expect("last-state poisoned");
        let mut map = std::collections::HashMap::new();

        if let Some(self_state) = &last.self_state {
            if let Some(beacon) = &self_state.beacon {
                map.insert(self_state.node.id.clone(), beacon.clone());
            }
        }
        for (id, record) in &last.peers {
            if let Some(beacon) = &record.state.beacon {
                map.insert(id.clone(), beacon.clone());
            }
        }
        map
    }

    /// Stops the agent's collaborators.
    pub async fn shutdown(&self) {
        self.bus.shutdown().await;
        self.proxy.shutdown();
    }
}
