//! Client commands against a node's HTTP API.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use serde_json::Value;

use hypercore_types::VmSpawnRequest;

/// Endpoint from the flag, `HYPERCORE_ENDPOINT`, or the local default.
fn endpoint(flag: Option<String>) -> String {
    flag.or_else(|| std::env::var("HYPERCORE_ENDPOINT").ok())
        .unwrap_or_else(|| "http://127.0.0.1:3001".to_string())
}

/// Parses `HOST:CONTAINER` (or a bare `PORT` mapped to itself).
fn parse_port(mapping: &str) -> Result<(u32, u32)> {
    match mapping.split_once(':') {
        Some((host, container)) => Ok((
            host.parse().with_context(|| format!("bad host port {host:?}"))?,
            container
                .parse()
                .with_context(|| format!("bad container port {container:?}"))?,
        )),
        None => {
            let port: u32 = mapping
                .parse()
                .with_context(|| format!("bad port {mapping:?}"))?;
            Ok((port, port))
        }
    }
}

/// Unwraps the API's `{"response": …} | {"error": …}` envelope.
fn unwrap_response(body: Value) -> Result<Value> {
    if let Some(error) = body.get("error").and_then(Value::as_str) {
        bail!("{error}");
    }
    body.get("response")
        .cloned()
        .context("malformed API response")
}

pub async fn spawn(
    image: String,
    cores: u32,
    memory: u32,
    ports: Vec<String>,
    env: Vec<String>,
    endpoint_flag: Option<String>,
) -> Result<()> {
    let mut port_map = BTreeMap::new();
    for mapping in &ports {
        let (host, container) = parse_port(mapping)?;
        port_map.insert(host, container);
    }

    let spec = VmSpawnRequest {
        cores,
        memory_mib: memory,
        image_ref: image,
        ports: port_map,
        env,
        dry_run: false,
    };

    let base = endpoint(endpoint_flag);
    let body: Value = reqwest::Client::new()
        .post(format!("{base}/spawn"))
        .json(&spec)
        .send()
        .await
        .with_context(|| format!("connecting to {base}"))?
        .json()
        .await?;

    let response = unwrap_response(body)?;
    println!(
        "spawned {} at {}",
        response["id"].as_str().unwrap_or("?"),
        response["url"].as_str().unwrap_or("?")
    );
    Ok(())
}

pub async fn stop(id: String, endpoint_flag: Option<String>) -> Result<()> {
    let base = endpoint(endpoint_flag);
    let body: Value = reqwest::Client::new()
        .post(format!("{base}/stop?id={id}"))
        .send()
        .await
        .with_context(|| format!("connecting to {base}"))?
        .json()
        .await?;

    let response = unwrap_response(body)?;
    println!(
        "stopped {id} (owner {})",
        response["id"].as_str().unwrap_or("?")
    );
    Ok(())
}

pub async fn list(endpoint_flag: Option<String>) -> Result<()> {
    let base = endpoint(endpoint_flag);
    let body: Value = reqwest::Client::new()
        .get(format!("{base}/list"))
        .send()
        .await
        .with_context(|| format!("connecting to {base}"))?
        .json()
        .await?;

    let states = unwrap_response(body)?;
    for state in states.as_array().into_iter().flatten() {
        let node = state["node"]["id"].as_str().unwrap_or("?");
        let workloads = state["workloads"].as_array().map_or(0, Vec::len);
        println!("{node}  {workloads} workload(s)");
        for workload in state["workloads"].as_array().into_iter().flatten() {
            println!(
                "  {}  {}",
                workload["id"].as_str().unwrap_or("?"),
                workload["source"]["image_ref"].as_str().unwrap_or("?")
            );
        }
    }
    Ok(())
}

pub async fn logs(id: String, endpoint_flag: Option<String>) -> Result<()> {
    let base = endpoint(endpoint_flag);
    let body: Value = reqwest::Client::new()
        .get(format!("{base}/logs?id={id}"))
        .send()
        .await
        .with_context(|| format!("connecting to {base}"))?
        .json()
        .await?;

    let response = unwrap_response(body)?;
    print!("{}", response.as_str().unwrap_or_default());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_mapping() {
        assert_eq!(parse_port("80:8080").unwrap(), (80, 8080));
        assert_eq!(parse_port("443").unwrap(), (443, 443));
        assert!(parse_port("abc:80").is_err());
    }

    #[test]
    fn test_unwrap_response() {
        let ok = serde_json::json!({"response": {"id": "x"}});
        assert_eq!(unwrap_response(ok).unwrap()["id"], "x");

        let err = serde_json::json!({"error": "nope"});
        assert!(unwrap_response(err).is_err());
    }

    #[test]
    fn test_endpoint_default() {
        // No flag and (very likely) no env: the local default.
        if std::env::var("HYPERCORE_ENDPOINT").is_err() {
            assert_eq!(endpoint(None), "http://127.0.0.1:3001");
        }
        assert_eq!(endpoint(Some("http://n1:3001".into())), "http://n1:3001");
    }
}
