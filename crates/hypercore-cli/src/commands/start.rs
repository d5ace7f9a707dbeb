//! The `start` command: wire the node together and run it.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::signal;
use tracing::{info, warn};

use hypercore_agent::{Agent, AgentConfig};
use hypercore_config::HypercoreConfig;
use hypercore_gossip::{GossipBus, GossipConfig};
use hypercore_policy::Policy;
use hypercore_proxy::{ServiceProxy, TlsConfig};
use hypercore_runtime::MemoryRuntime;
use hypercore_types::NodeIdentity;

/// Flags accepted by `hypercore start`; each overrides its config-file
/// counterpart.
pub struct StartArgs {
    pub config_dir: Option<PathBuf>,
    pub bind_addr: Option<String>,
    pub api_addr: Option<String>,
    pub base_url: Option<String>,
    pub seeds: Vec<String>,
    pub policy: Option<PathBuf>,
    pub respawn_on_node_failure: bool,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

pub async fn run(args: StartArgs) -> Result<()> {
    let mut config = match &args.config_dir {
        Some(dir) => HypercoreConfig::load_from_dir(dir)?,
        None => HypercoreConfig::load()?,
    };
    apply_overrides(&mut config, &args);

    let bind_addr: SocketAddr = config
        .node
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address {:?}", config.node.bind_addr))?;
    let api_addr: SocketAddr = config
        .api
        .listen_addr
        .parse()
        .with_context(|| format!("invalid API address {:?}", config.api.listen_addr))?;

    let identity = NodeIdentity::generate(bind_addr, config.node.base_url.clone());
    info!(node = %identity, "node identity generated");

    // Gossip bus
    let mut bus_config = GossipConfig::new(identity.name(), bind_addr);
    bus_config.gossip_interval = Duration::from_secs(config.gossip.gossip_interval_secs);
    bus_config.probe_interval = Duration::from_secs(config.gossip.probe_interval_secs);
    bus_config.suspicion_multiplier = config.gossip.suspicion_multiplier;
    bus_config.fanout = config.gossip.fanout;
    bus_config.max_event_payload = config.gossip.max_event_payload;
    bus_config.seeds = resolve_seeds(&config.node.seeds)?;
    let bus = Arc::new(GossipBus::start(bus_config).await?);

    // The bus may have resolved port 0; advertise what it actually bound.
    let identity = NodeIdentity {
        bind_addr: bus.local_addr(),
        ..identity
    };

    // Service proxy, with TLS termination when configured.
    let proxy = match (&config.proxy.tls_cert, &config.proxy.tls_key) {
        (Some(cert), Some(key)) => {
            let tls = TlsConfig::new(cert, key);
            Arc::new(ServiceProxy::new().with_tls(&tls)?)
        }
        (None, None) => Arc::new(ServiceProxy::new()),
        _ => bail!("TLS needs both --tls-cert and --tls-key"),
    };

    // Policy
    let policy = match &config.policy.path {
        Some(path) => {
            Policy::load(path).with_context(|| format!("loading policy {}", path.display()))?
        }
        None => Policy::permissive(),
    };

    // Runtime backend, chosen at process start.
    let runtime = Arc::new(MemoryRuntime::new());

    tokio::fs::create_dir_all(&config.agent.log_dir)
        .await
        .with_context(|| format!("creating log dir {}", config.agent.log_dir.display()))?;

    let agent_config = AgentConfig {
        monitor_interval: Duration::from_secs(config.agent.monitor_interval_secs),
        queue_alert_threshold: config.agent.queue_alert_threshold,
        queue_ceiling: config.agent.queue_ceiling,
        respawn_on_node_failure: config.agent.respawn_on_node_failure,
        respawn_grace: Duration::from_secs(config.agent.respawn_grace_secs),
        log_dir: config.agent.log_dir.clone(),
        log_service_port: api_addr.port(),
        capacity_cores: config.agent.capacity_cores,
        price_per_gb: config.agent.price_per_gb,
        reputation: config.agent.reputation,
        capabilities: config.agent.capabilities.clone(),
        ..AgentConfig::default()
    };

    let agent = Agent::new(
        identity,
        agent_config,
        runtime as Arc<dyn hypercore_runtime::ContainerRuntime>,
        Arc::clone(&bus),
        proxy,
        policy,
    );
    agent.run();

    let api_agent = Arc::clone(&agent);
    tokio::select! {
        result = hypercore_api::serve(api_agent, api_addr) => {
            result.context("API server exited")?;
        }
        _ = signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
            agent.shutdown().await;
        }
    }

    Ok(())
}

fn apply_overrides(config: &mut HypercoreConfig, args: &StartArgs) {
    if let Some(bind_addr) = &args.bind_addr {
        config.node.bind_addr = bind_addr.clone();
    }
    if let Some(api_addr) = &args.api_addr {
        config.api.listen_addr = api_addr.clone();
    }
    if let Some(base_url) = &args.base_url {
        config.node.base_url = base_url.clone();
    }
    if !args.seeds.is_empty() {
        config.node.seeds = args.seeds.clone();
    }
    if let Some(policy) = &args.policy {
        config.policy.path = Some(policy.clone());
    }
    if args.respawn_on_node_failure {
        config.agent.respawn_on_node_failure = true;
    }
    if let Some(cert) = &args.tls_cert {
        config.proxy.tls_cert = Some(cert.clone());
    }
    if let Some(key) = &args.tls_key {
        config.proxy.tls_key = Some(key.clone());
    }
    if let Some(log_dir) = &args.log_dir {
        config.agent.log_dir = log_dir.clone();
    }
}

fn resolve_seeds(seeds: &[String]) -> Result<Vec<SocketAddr>> {
    let mut resolved = Vec::with_capacity(seeds.len());
    for seed in seeds {
        match seed.to_socket_addrs() {
            Ok(mut addrs) => match addrs.next() {
                Some(addr) => resolved.push(addr),
                None => warn!(%seed, "seed resolved to no addresses"),
            },
            Err(e) => bail!("invalid seed {seed:?}: {e}"),
        }
    }
    Ok(resolved)
}
