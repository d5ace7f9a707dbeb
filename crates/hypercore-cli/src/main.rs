//! Hypercore unified CLI.
//!
//! Peer-to-peer workload orchestration for flat compute clusters.
//!
//! # Quick Start
//!
//! ```bash
//! # Start a node
//! hypercore start --bind-addr 0.0.0.0:7946 --base-url vm.example.com
//!
//! # Join a second node to it
//! hypercore start --bind-addr 0.0.0.0:7946 --seed 10.0.0.1:7946
//!
//! # Submit a workload to any node
//! hypercore spawn nginx:latest --cores 1 --memory 512 --port 80:80
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Hypercore - peer-to-peer workload orchestration.
#[derive(Parser)]
#[command(name = "hypercore")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Start a cluster node.
    Start {
        /// Project directory holding hypercore.toml.
        #[arg(long)]
        config_dir: Option<PathBuf>,

        /// Gossip/RPC bind address (host:port).
        #[arg(long)]
        bind_addr: Option<String>,

        /// External API listen address (host:port).
        #[arg(long)]
        api_addr: Option<String>,

        /// Base-URL suffix for workload virtual hostnames.
        #[arg(long)]
        base_url: Option<String>,

        /// Seed peer to join (repeatable).
        #[arg(long = "seed")]
        seeds: Vec<String>,

        /// TOML policy file.
        #[arg(long)]
        policy: Option<PathBuf>,

        /// Re-dispatch workloads of failed peers.
        #[arg(long)]
        respawn_on_node_failure: bool,

        /// PEM certificate for TLS-terminated ingress.
        #[arg(long)]
        tls_cert: Option<PathBuf>,

        /// PEM private key for TLS-terminated ingress.
        #[arg(long)]
        tls_key: Option<PathBuf>,

        /// Directory for workload log files.
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },

    /// Spawn a workload on the cluster.
    Spawn {
        /// Image reference to boot.
        image: String,

        /// CPU cores.
        #[arg(short, long, default_value_t = 1)]
        cores: u32,

        /// Memory in MiB.
        #[arg(short, long, default_value_t = 512)]
        memory: u32,

        /// Port mapping HOST:CONTAINER (repeatable).
        #[arg(short, long = "port")]
        ports: Vec<String>,

        /// Environment entry KEY=VALUE (repeatable).
        #[arg(short, long = "env")]
        env: Vec<String>,

        /// Node API endpoint (or HYPERCORE_ENDPOINT).
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Stop a workload anywhere in the cluster.
    Stop {
        /// Workload id.
        id: String,

        /// Node API endpoint (or HYPERCORE_ENDPOINT).
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// List cluster-wide workload state.
    List {
        /// Node API endpoint (or HYPERCORE_ENDPOINT).
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Fetch a workload's logs from its owning node.
    Logs {
        /// Workload id.
        id: String,

        /// Node API endpoint (or HYPERCORE_ENDPOINT).
        #[arg(long)]
        endpoint: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Version => {
            println!("hypercore {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Start {
            config_dir,
            bind_addr,
            api_addr,
            base_url,
            seeds,
            policy,
            respawn_on_node_failure,
            tls_cert,
            tls_key,
            log_dir,
        } => {
            commands::start::run(commands::start::StartArgs {
                config_dir,
                bind_addr,
                api_addr,
                base_url,
                seeds,
                policy,
                respawn_on_node_failure,
                tls_cert,
                tls_key,
                log_dir,
            })
            .await
        }
        Commands::Spawn {
            image,
            cores,
            memory,
            ports,
            env,
            endpoint,
        } => commands::workloads::spawn(image, cores, memory, ports, env, endpoint).await,
        Commands::Stop { id, endpoint } => commands::workloads::stop(id, endpoint).await,
        Commands::List { endpoint } => commands::workloads::list(endpoint).await,
        Commands::Logs { id, endpoint } => commands::workloads::logs(id, endpoint).await,
    }
}
