//! # hypercore-api: The external HTTP surface
//!
//! A thin JSON facade over the agent: `POST /spawn`, `POST /stop`,
//! `GET /list`, `GET /logs`, plus observability (`GET /metrics`,
//! `GET /health`) and the node-to-node log endpoint `GET /logs/local`.
//! Results wrap as `{"response": …}` with 200 or `{"error": "…"}` with
//! 400. No authentication: deployments front this with a reverse proxy.

mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tracing::info;

use hypercore_agent::Agent;

/// Shared handler state.
#[derive(Clone)]
pub(crate) struct AppState {
    pub agent: Arc<Agent>,
    pub client: reqwest::Client,
}

/// Builds the API router for an agent.
pub fn router(agent: Arc<Agent>) -> Router {
    let state = AppState {
        agent,
        client: reqwest::Client::new(),
    };

    Router::new()
        .route("/spawn", post(routes::spawn))
        .route("/stop", post(routes::stop))
        .route("/list", get(routes::list))
        .route("/logs", get(routes::logs))
        .route("/logs/local", get(routes::logs_local))
        .route("/metrics", get(routes::metrics))
        .route("/health", get(routes::health))
        .with_state(state)
}

/// Binds and serves the API until the process exits.
pub async fn serve(agent: Arc<Agent>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_on(agent, listener).await
}

/// Serves the API on an existing listener (tests bind port 0 first).
pub async fn serve_on(agent: Arc<Agent>, listener: TcpListener) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "API listening");
    axum::serve(listener, router(agent)).await
}
