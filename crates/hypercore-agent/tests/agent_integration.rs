//! End-to-end agent scenarios over real loopback transports.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::timeout;

use hypercore_agent::{Agent, AgentConfig, AgentError};
use hypercore_gossip::{GossipBus, GossipConfig};
use hypercore_policy::Policy;
use hypercore_proxy::ServiceProxy;
use hypercore_runtime::MemoryRuntime;
use hypercore_types::{NodeIdentity, VmSpawnRequest};

struct TestNode {
    agent: Arc<Agent>,
    runtime: Arc<MemoryRuntime>,
    bus: Arc<GossipBus>,
}

async fn start_node(seeds: Vec<std::net::SocketAddr>, config: AgentConfig) -> TestNode {
    let identity = NodeIdentity::generate("127.0.0.1:0".parse().unwrap(), "vm.test");

    let mut bus_config = GossipConfig::new(identity.name(), identity.bind_addr);
    bus_config.gossip_interval = Duration::from_millis(50);
    bus_config.probe_interval = Duration::from_millis(100);
    bus_config.seeds = seeds;

    let bus = Arc::new(GossipBus::start(bus_config).await.unwrap());
    let identity = NodeIdentity {
        bind_addr: bus.local_addr(),
        ..identity
    };

    let runtime = Arc::new(MemoryRuntime::new());
    let proxy = Arc::new(ServiceProxy::bound_to(IpAddr::V4(Ipv4Addr::LOCALHOST)));

    let agent = Agent::new(
        identity,
        config,
        Arc::clone(&runtime) as Arc<dyn hypercore_runtime::ContainerRuntime>,
        Arc::clone(&bus),
        proxy,
        Policy::permissive(),
    );
    agent.run();

    TestNode {
        agent,
        runtime,
        bus,
    }
}

fn fast_agent_config() -> AgentConfig {
    AgentConfig {
        monitor_interval: Duration::from_millis(100),
        probe_timeout: Duration::from_secs(2),
        commit_timeout: Duration::from_secs(5),
        capacity_cores: Some(8),
        ..AgentConfig::default()
    }
}

async fn free_port() -> u32 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    u32::from(listener.local_addr().unwrap().port())
}

fn spec(cores: u32, host_port: Option<u32>) -> VmSpawnRequest {
    VmSpawnRequest {
        cores,
        memory_mib: 512,
        image_ref: "nginx".to_string(),
        ports: host_port.map(|p| (p, 80)).into_iter().collect(),
        env: vec![],
        dry_run: false,
    }
}

#[tokio::test]
async fn single_node_spawn_registers_state_and_ingress() {
    let node = start_node(vec![], fast_agent_config()).await;
    let port = free_port().await;

    let response = timeout(
        Duration::from_secs(10),
        node.agent.spawn_workload(spec(1, Some(port))),
    )
    .await
    .expect("spawn timed out")
    .expect("spawn failed");

    assert!(!response.id.is_empty());
    assert_eq!(response.url, format!("{}.vm.test", response.id));
    assert_eq!(node.runtime.task_count(), 1);

    // The next monitor tick must include the workload in the self view.
    timeout(Duration::from_secs(5), async {
        loop {
            let state = node.agent.cluster_state();
            if state
                .iter()
                .any(|s| s.workloads.iter().any(|w| w.id == response.id))
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("workload never appeared in self state");

    node.agent.shutdown().await;
}

#[tokio::test]
async fn quiescent_node_broadcasts_once() {
    let node = start_node(vec![], fast_agent_config()).await;

    // Several monitor periods pass on an empty node.
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(node.agent.metrics().state_changes.get(), 1);
    assert_eq!(node.agent.metrics().broadcast_skipped.get(), 0);

    node.agent.shutdown().await;
}

#[tokio::test]
async fn capacity_exhaustion_surfaces_reason() {
    let config = AgentConfig {
        capacity_cores: Some(2),
        ..fast_agent_config()
    };
    let node = start_node(vec![], config).await;

    timeout(
        Duration::from_secs(10),
        node.agent.spawn_workload(spec(2, None)),
    )
    .await
    .unwrap()
    .expect("first spawn should fit");

    let err = timeout(
        Duration::from_secs(10),
        node.agent.spawn_workload(spec(1, None)),
    )
    .await
    .unwrap()
    .expect_err("second spawn should exhaust capacity");

    match err {
        AgentError::Peer(reason) => assert!(reason.contains("insufficient cores")),
        other => panic!("unexpected error: {other}"),
    }

    node.agent.shutdown().await;
}

#[tokio::test]
async fn two_node_spawn_then_stop_via_other_node() {
    let a = start_node(vec![], fast_agent_config()).await;
    let b = start_node(vec![a.bus.local_addr()], fast_agent_config()).await;

    // Wait for membership to converge.
    timeout(Duration::from_secs(5), async {
        loop {
            if a.bus.members().len() == 2 && b.bus.members().len() == 2 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("nodes never joined");

    let response = timeout(
        Duration::from_secs(10),
        a.agent.spawn_workload(spec(1, None)),
    )
    .await
    .unwrap()
    .expect("spawn failed");

    let total = a.runtime.task_count() + b.runtime.task_count();
    assert_eq!(total, 1, "workload must land on exactly one node");

    // Stop through whichever node is NOT the owner; its own "not found"
    // is ignored and the owner's ack wins.
    let non_owner = if a.runtime.task_count() == 1 {
        &b.agent
    } else {
        &a.agent
    };
    let owner_ref = timeout(
        Duration::from_secs(10),
        non_owner.stop_workload(&response.id),
    )
    .await
    .unwrap()
    .expect("stop failed");

    assert!(!owner_ref.id.is_empty());
    assert_eq!(a.runtime.task_count() + b.runtime.task_count(), 0);

    a.agent.shutdown().await;
    b.agent.shutdown().await;
}

#[tokio::test]
async fn peer_state_propagates_and_evicts() {
    let a = start_node(vec![], fast_agent_config()).await;
    let b = start_node(vec![a.bus.local_addr()], fast_agent_config()).await;
    let b_name = b.bus.node_name().to_string();

    timeout(Duration::from_secs(5), async {
        loop {
            if a.bus.members().len() == 2 && b.bus.members().len() == 2 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("nodes never joined");

    // B's first digest reaches A as a peer record.
    timeout(Duration::from_secs(5), async {
        loop {
            if a.agent
                .cluster_state()
                .iter()
                .any(|s| s.node.id == b_name)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("peer state never arrived");

    // Kill B; after 3T of silence the record must be gone.
    b.agent.shutdown().await;
    drop(b);

    timeout(Duration::from_secs(10), async {
        loop {
            if a.agent
                .cluster_state()
                .iter()
                .all(|s| s.node.id != b_name)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("stale peer never evicted");

    a.agent.shutdown().await;
}
