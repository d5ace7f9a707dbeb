//! HTTP facade exercised over a real single-node agent.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;

use hypercore_agent::{Agent, AgentConfig};
use hypercore_gossip::{GossipBus, GossipConfig};
use hypercore_policy::Policy;
use hypercore_proxy::ServiceProxy;
use hypercore_runtime::MemoryRuntime;
use hypercore_types::NodeIdentity;

async fn start_api(log_dir: std::path::PathBuf) -> (Arc<Agent>, String) {
    let identity = NodeIdentity::generate("127.0.0.1:0".parse().unwrap(), "vm.test");

    let mut bus_config = GossipConfig::new(identity.name(), identity.bind_addr);
    bus_config.gossip_interval = Duration::from_millis(50);
    bus_config.probe_interval = Duration::from_millis(100);
    let bus = Arc::new(GossipBus::start(bus_config).await.unwrap());

    let agent = Agent::new(
        NodeIdentity {
            bind_addr: bus.local_addr(),
            ..identity
        },
        AgentConfig {
            monitor_interval: Duration::from_millis(100),
            probe_timeout: Duration::from_secs(2),
            commit_timeout: Duration::from_secs(5),
            capacity_cores: Some(8),
            log_dir,
            ..AgentConfig::default()
        },
        Arc::new(MemoryRuntime::new()) as Arc<dyn hypercore_runtime::ContainerRuntime>,
        bus,
        Arc::new(ServiceProxy::bound_to(IpAddr::V4(Ipv4Addr::LOCALHOST))),
        Policy::permissive(),
    );
    agent.run();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let served = Arc::clone(&agent);
    tokio::spawn(async move {
        let _ = hypercore_api::serve_on(served, listener).await;
    });

    (agent, base)
}

#[tokio::test]
async fn spawn_list_stop_round_trip() {
    let log_dir = tempfile::tempdir().unwrap();
    let (agent, base) = start_api(log_dir.path().to_path_buf()).await;
    let client = reqwest::Client::new();

    // Spawn
    let body: Value = timeout(
        Duration::from_secs(10),
        async {
            client
                .post(format!("{base}/spawn"))
                .json(&serde_json::json!({
                    "cores": 1,
                    "memory_mib": 512,
                    "image_ref": "nginx",
                    "ports": {},
                    "env": []
                }))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap()
        },
    )
    .await
    .unwrap();

    let id = body["response"]["id"].as_str().expect("spawn id").to_string();
    assert!(!id.is_empty());
    assert_eq!(
        body["response"]["url"].as_str().unwrap(),
        format!("{id}.vm.test")
    );

    // List eventually shows the workload.
    timeout(Duration::from_secs(5), async {
        loop {
            let listed: Value = client
                .get(format!("{base}/list"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            let found = listed["response"]
                .as_array()
                .map(|states| {
                    states.iter().any(|s| {
                        s["workloads"]
                            .as_array()
                            .is_some_and(|ws| ws.iter().any(|w| w["id"] == id.as_str()))
                    })
                })
                .unwrap_or(false);
            if found {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("workload never listed");

    // Logs for a workload with a log file.
    tokio::fs::write(agent.local_log_path(&id), b"boot ok\n")
        .await
        .unwrap();
    let logs: Value = client
        .get(format!("{base}/logs?id={id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(logs["response"].as_str().unwrap(), "boot ok\n");

    // Stop
    let stopped = client
        .post(format!("{base}/stop?id={id}"))
        .send()
        .await
        .unwrap();
    assert!(stopped.status().is_success());

    agent.shutdown().await;
}

#[tokio::test]
async fn errors_wrap_with_400() {
    let log_dir = tempfile::tempdir().unwrap();
    let (agent, base) = start_api(log_dir.path().to_path_buf()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/stop?id=nonexistent"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("nonexistent"));

    agent.shutdown().await;
}

#[tokio::test]
async fn metrics_and_health_endpoints() {
    let log_dir = tempfile::tempdir().unwrap();
    let (agent, base) = start_api(log_dir.path().to_path_buf()).await;
    let client = reqwest::Client::new();

    let metrics = client
        .get(format!("{base}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("cluster_workload_count"));
    assert!(metrics.contains("cluster_broadcast_skipped_total"));

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["response"]["status"], "ok");

    agent.shutdown().await;
}
