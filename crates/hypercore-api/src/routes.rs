//! Route handlers.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use hypercore_agent::WorkloadHome;
use hypercore_types::VmSpawnRequest;

use crate::AppState;

/// `{"response": …}` with 200.
fn ok(value: impl serde::Serialize) -> Response {
    (StatusCode::OK, Json(json!({ "response": value }))).into_response()
}

/// `{"error": "…"}` with 400.
fn error(message: impl std::fmt::Display) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.to_string() })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub(crate) struct IdParams {
    id: String,
}

/// `POST /spawn`: body is the workload descriptor.
pub(crate) async fn spawn(
    State(state): State<AppState>,
    Json(spec): Json<VmSpawnRequest>,
) -> Response {
    debug!(image = %spec.image_ref, cores = spec.cores, "spawn requested");
    match state.agent.spawn_workload(spec).await {
        Ok(response) => ok(response),
        Err(e) => error(e),
    }
}

/// `POST /stop?id=…`: broadcast stop; the owner's ack wins.
pub(crate) async fn stop(
    State(state): State<AppState>,
    Query(params): Query<IdParams>,
) -> Response {
    match state.agent.stop_workload(&params.id).await {
        Ok(node) => ok(node),
        Err(e) => error(e),
    }
}

/// `GET /list`: self view plus all peer states.
pub(crate) async fn list(State(state): State<AppState>) -> Response {
    ok(state.agent.cluster_state())
}

/// `GET /logs?id=…`: local read or forwarded to the owning node.
pub(crate) async fn logs(
    State(state): State<AppState>,
    Query(params): Query<IdParams>,
) -> Response {
    match state.agent.locate_workload(&params.id) {
        Some(WorkloadHome::Local) => match state.agent.read_local_log(&params.id).await {
            Ok(bytes) => ok(String::from_utf8_lossy(&bytes)),
            Err(e) => error(e),
        },
        Some(WorkloadHome::Peer { node_id, .. }) => {
            let Some(endpoint) = state.agent.peer_log_endpoint(&params.id) else {
                return error(format!("owner {node_id} has no known address"));
            };
            let url = format!("http://{endpoint}/logs/local?id={}", params.id);
            match state.client.get(&url).send().await {
                Ok(response) if response.status().is_success() => match response.text().await {
                    Ok(text) => ok(text),
                    Err(e) => error(e),
                },
                Ok(response) => error(format!("log fetch failed: {}", response.status())),
                Err(e) => error(e),
            }
        }
        None => error(format!("workload {} not found", params.id)),
    }
}

/// `GET /logs/local?id=…`: raw bytes of a local workload's log file.
pub(crate) async fn logs_local(
    State(state): State<AppState>,
    Query(params): Query<IdParams>,
) -> Response {
    match state.agent.read_local_log(&params.id).await {
        Ok(bytes) => (StatusCode::OK, bytes).into_response(),
        Err(e) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

/// `GET /metrics`: Prometheus text format.
pub(crate) async fn metrics(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.agent.metrics().render(),
    )
        .into_response()
}

/// `GET /health`: liveness.
pub(crate) async fn health() -> Response {
    ok(json!({ "status": "ok" }))
}
