//! The service proxy: listener set and routing tables.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, copy_bidirectional};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::error::{ProxyError, Result};
use crate::host::{head_end, parse_host, service_key};
use crate::tls::TlsConfig;

/// Parse budget for one request head.
const MAX_HEAD_SIZE: usize = 16 * 1024;

/// Routing state guarded by the proxy mutex: which ports have listeners
/// and, per port, the service-key table.
#[derive(Debug, Default)]
struct Tables {
    ports: BTreeSet<u16>,
    routes: HashMap<u16, HashMap<String, SocketAddr>>,
}

/// The ingress proxy.
///
/// A leaf component: the agent registers routes into it and reads
/// [`ServiceProxy::services`] back out for its self-digest; the proxy
/// never calls back into the agent.
pub struct ServiceProxy {
    bind_ip: IpAddr,
    tables: Arc<Mutex<Tables>>,
    tls: Option<TlsAcceptor>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ServiceProxy {
    /// A plain-TCP proxy binding listeners on all interfaces.
    pub fn new() -> Self {
        Self::bound_to(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    /// A proxy binding listeners on a specific interface.
    pub fn bound_to(bind_ip: IpAddr) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            bind_ip,
            tables: Arc::new(Mutex::new(Tables::default())),
            tls: None,
            shutdown_tx,
        }
    }

    /// Enables TLS termination on every listener created afterwards.
    pub fn with_tls(mut self, config: &TlsConfig) -> Result<Self> {
        self.tls = Some(config.build_acceptor()?);
        Ok(self)
    }

    /// Registers a route, creating the host-port listener on first use.
    ///
    /// Idempotent: re-registering a (key, port) pair replaces the prior
    /// target address. A bind failure leaves no partial state.
    pub async fn register(
        &self,
        host_port: u16,
        service_key: &str,
        target: SocketAddr,
    ) -> Result<()> {
        let needs_listener = {
            let mut tables = self.tables.lock().expect("proxy tables poisoned");
            let exists = tables.ports.contains(&host_port);
            if exists {
                tables
                    .routes
                    .entry(host_port)
                    .or_default()
                    .insert(service_key.to_string(), target);
            }
            !exists
        };

        if !needs_listener {
            debug!(host_port, service_key, %target, "route updated");
            return Ok(());
        }

        // Bind outside the lock; the listener is only published once it
        // exists.
        let listener = TcpListener::bind(SocketAddr::new(self.bind_ip, host_port))
            .await
            .map_err(|source| ProxyError::BindFailed {
                port: host_port,
                source,
            })?;

        {
            let mut tables = self.tables.lock().expect("proxy tables poisoned");
            if tables.ports.contains(&host_port) {
                // Another register won the bind race; ours is redundant.
                tables
                    .routes
                    .entry(host_port)
                    .or_default()
                    .insert(service_key.to_string(), target);
                return Ok(());
            }
            tables.ports.insert(host_port);
            tables
                .routes
                .entry(host_port)
                .or_default()
                .insert(service_key.to_string(), target);
        }

        info!(host_port, service_key, %target, "ingress listener created");
        self.spawn_listener(host_port, listener);
        Ok(())
    }

    /// Service-key → host-ports mapping, for the self-digest.
    pub fn services(&self) -> BTreeMap<String, BTreeSet<u16>> {
        let tables = self.tables.lock().expect("proxy tables poisoned");
        let mut services: BTreeMap<String, BTreeSet<u16>> = BTreeMap::new();
        for (port, table) in &tables.routes {
            for key in table.keys() {
                services.entry(key.clone()).or_default().insert(*port);
            }
        }
        services
    }

    /// Host ports that currently have a listener.
    pub fn ports(&self) -> BTreeSet<u16> {
        self.tables.lock().expect("proxy tables poisoned").ports.clone()
    }

    /// Current target for a (key, port) pair.
    pub fn lookup(&self, host_port: u16, service_key: &str) -> Option<SocketAddr> {
        self.tables
            .lock()
            .expect("proxy tables poisoned")
            .routes
            .get(&host_port)
            .and_then(|table| table.get(service_key))
            .copied()
    }

    /// Stops every listener. Each cleans its port from the set on exit.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    fn spawn_listener(&self, host_port: u16, listener: TcpListener) {
        let tables = Arc::clone(&self.tables);
        let tls = self.tls.clone();
        let mut shutdown = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    accepted = listener.accept() => {
                        let (stream, peer) = match accepted {
                            Ok(pair) => pair,
                            Err(e) => {
                                warn!(host_port, error = %e, "accept failed, closing listener");
                                break;
                            }
                        };
                        let tables = Arc::clone(&tables);
                        let tls = tls.clone();
                        tokio::spawn(async move {
                            let outcome = match tls {
                                Some(acceptor) => match acceptor.accept(stream).await {
                                    Ok(tls_stream) => {
                                        serve_connection(tls_stream, host_port, &tables).await
                                    }
                                    Err(e) => {
                                        debug!(%peer, error = %e, "TLS handshake failed");
                                        return;
                                    }
                                },
                                None => serve_connection(stream, host_port, &tables).await,
                            };
                            if let Err(e) = outcome {
                                // No response body on routing errors; the
                                // connection just closes.
                                debug!(%peer, host_port, error = %e, "connection dropped");
                            }
                        });
                    }
                }
            }

            // Listener exit cleans its host-port from the set.
            let mut tables = tables.lock().expect("proxy tables poisoned");
            tables.ports.remove(&host_port);
            tables.routes.remove(&host_port);
            info!(host_port, "ingress listener closed");
        });
    }
}

impl Default for ServiceProxy {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes one accepted connection: parse the head, find the target,
/// replay the buffered bytes, then splice the two streams.
async fn serve_connection<S>(
    mut client: S,
    host_port: u16,
    tables: &Arc<Mutex<Tables>>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(4096);

    let end = loop {
        if let Some(end) = head_end(&buf) {
            break end;
        }
        if buf.len() > MAX_HEAD_SIZE {
            return Err(ProxyError::HeadTooLarge);
        }
        let n = client.read_buf(&mut buf).await?;
        if n == 0 {
            return Err(ProxyError::ClosedEarly);
        }
    };

    let head = std::str::from_utf8(&buf[..end]).map_err(|_| ProxyError::MalformedHost)?;
    let host = parse_host(head).ok_or(ProxyError::MalformedHost)?;
    let key = service_key(host).ok_or(ProxyError::MalformedHost)?;

    let target = {
        let tables = tables.lock().expect("proxy tables poisoned");
        tables
            .routes
            .get(&host_port)
            .and_then(|table| table.get(key))
            .copied()
    }
    .ok_or_else(|| ProxyError::UnknownService {
        key: key.to_string(),
        port: host_port,
    })?;

    let mut upstream = TcpStream::connect(target).await?;
    // Replay everything read so far, head and any body bytes alike.
    upstream.write_all(&buf).await?;
    upstream.flush().await?;

    let _ = copy_bidirectional(&mut client, &mut upstream).await;
    Ok(())
}
