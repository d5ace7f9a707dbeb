//! The gossip bus itself.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use rand::seq::SliceRandom;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, timeout};
use tracing::{debug, info, warn};

use hypercore_wire::Frame;

use crate::config::GossipConfig;
use crate::error::{GossipError, Result};
use crate::event::{EventQueue, InboundEvent};
use crate::member::{Member, MemberTable};
use crate::packet::{Packet, QueryFrame, ResponseFrame};
use crate::query::{NodeResponse, QueryHandle, QueryParams};

/// Maximum members gossiped per heartbeat.
const HEARTBEAT_SAMPLE: usize = 10;

/// UDP receive buffer size.
const DATAGRAM_BUFFER: usize = 65_535;

/// A running gossip bus.
///
/// Binds one UDP socket (membership, user events) and one TCP listener
/// (queries) on the same port. All background tasks stop when
/// [`GossipBus::shutdown`] is called.
pub struct GossipBus {
    config: GossipConfig,
    local_addr: SocketAddr,
    socket: Arc<UdpSocket>,
    members: Arc<Mutex<MemberTable>>,
    events: EventQueue,
    outbound_tx: mpsc::UnboundedSender<OutboundEvent>,
    queue_depth: Arc<AtomicU64>,
    shutdown_tx: broadcast::Sender<()>,
}

struct OutboundEvent {
    name: String,
    payload: Bytes,
}

impl GossipBus {
    /// Binds the transports and starts the bus tasks.
    pub async fn start(config: GossipConfig) -> Result<Self> {
        let socket = Arc::new(UdpSocket::bind(config.bind_addr).await?);
        let local_addr = socket.local_addr()?;
        // The query listener shares the port number with the UDP socket.
        let listener = TcpListener::bind(local_addr).await?;

        info!(%local_addr, node = %config.node_name, "gossip bus listening");

        let members = Arc::new(Mutex::new(MemberTable::new(
            config.node_name.clone(),
            local_addr,
        )));
        let events = EventQueue::new(config.inbound_buffer);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let queue_depth = Arc::new(AtomicU64::new(0));
        let (shutdown_tx, _) = broadcast::channel(1);

        let bus = Self {
            config,
            local_addr,
            socket,
            members,
            events,
            outbound_tx,
            queue_depth,
            shutdown_tx,
        };

        bus.spawn_datagram_receiver();
        bus.spawn_gossip_tick();
        bus.spawn_probe_tick();
        bus.spawn_broadcast_sender(outbound_rx);
        bus.spawn_query_listener(listener);

        Ok(bus)
    }

    /// The actual bound address (useful when configured with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// This node's name on the bus.
    pub fn node_name(&self) -> &str {
        &self.config.node_name
    }

    /// Snapshot of the membership table, self included.
    pub fn members(&self) -> Vec<Member> {
        self.members.lock().expect("member table poisoned").snapshot()
    }

    /// Current depth of the outbound broadcast queue.
    pub fn queue_depth(&self) -> u64 {
        self.queue_depth.load(Ordering::Relaxed)
    }

    /// The inbound event queue. Single consumer.
    pub fn events(&self) -> EventQueue {
        self.events.clone()
    }

    /// Enqueues a best-effort multicast user event to all alive peers.
    pub fn broadcast_user_event(&self, name: &str, payload: Bytes) -> Result<()> {
        let cap = self.config.event_payload_cap();
        if payload.len() > cap {
            return Err(GossipError::PayloadTooLarge {
                len: payload.len(),
                cap,
            });
        }

        self.queue_depth.fetch_add(1, Ordering::Relaxed);
        self.outbound_tx
            .send(OutboundEvent {
                name: name.to_string(),
                payload,
            })
            .map_err(|_| {
                self.queue_depth.fetch_sub(1, Ordering::Relaxed);
                GossipError::Shutdown
            })
    }

    /// Issues a fan-out query and returns the response stream.
    ///
    /// One TCP exchange per selected member; members that fail or miss the
    /// deadline simply contribute nothing. The stream closes once every
    /// exchange has finished. Self-queries are served over loopback like
    /// any other: single-node clusters depend on this.
    pub fn query(
        &self,
        name: &str,
        payload: Bytes,
        params: QueryParams,
    ) -> mpsc::Receiver<NodeResponse> {
        let targets: Vec<(String, SocketAddr)> = {
            let members = self.members.lock().expect("member table poisoned");
            match &params.filter_nodes {
                Some(names) => names
                    .iter()
                    .filter_map(|n| members.addr_of(n).map(|addr| (n.clone(), addr)))
                    .collect(),
                None => members
                    .snapshot()
                    .into_iter()
                    .filter(|m| m.status == crate::member::MemberStatus::Alive)
                    .map(|m| (m.name, m.addr))
                    .collect(),
            }
        };

        let (tx, rx) = mpsc::channel(targets.len().max(1));
        let frame = QueryFrame {
            from: self.config.node_name.clone(),
            name: name.to_string(),
            payload: payload.to_vec(),
        };

        for (member_name, addr) in targets {
            let tx = tx.clone();
            let frame = frame.clone();
            let deadline = params.timeout;
            tokio::spawn(async move {
                match timeout(deadline, query_exchange(addr, frame)).await {
                    Ok(Ok(Some(response))) => {
                        let _ = tx
                            .send(NodeResponse {
                                from: response.from,
                                payload: response.payload.into(),
                            })
                            .await;
                    }
                    Ok(Ok(None)) => {
                        debug!(member = %member_name, "query closed without response");
                    }
                    Ok(Err(e)) => {
                        debug!(member = %member_name, error = %e, "query exchange failed");
                    }
                    Err(_) => {
                        debug!(member = %member_name, "query deadline expired");
                    }
                }
            });
        }

        rx
    }

    /// Announces departure and stops all bus tasks.
    pub async fn shutdown(&self) {
        let peers: Vec<SocketAddr> = {
            let members = self.members.lock().expect("member table poisoned");
            members.alive_peers().into_iter().map(|m| m.addr).collect()
        };

        let leave = Packet::Leave {
            from: self.config.node_name.clone(),
        };
        if let Ok(bytes) = leave.encode() {
            for addr in peers {
                let _ = self.socket.send_to(&bytes, addr).await;
            }
        }

        let _ = self.shutdown_tx.send(());
    }

    // ------------------------------------------------------------------
    // Background tasks
    // ------------------------------------------------------------------

    fn spawn_datagram_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let members = Arc::clone(&self.members);
        let events = self.events.clone();
        let self_name = self.config.node_name.clone();
        let mut shutdown = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut buf = vec![0u8; DATAGRAM_BUFFER];
            loop {
                tokio::select! {
                    _ = shutdown.recv() => return,
                    received = socket.recv_from(&mut buf) => {
                        let (len, src) = match received {
                            Ok(pair) => pair,
                            Err(e) => {
                                warn!(error = %e, "datagram receive failed");
                                continue;
                            }
                        };
                        let packet = match Packet::decode(&buf[..len]) {
                            Ok(packet) => packet,
                            Err(e) => {
                                warn!(%src, error = %e, "dropping undecodable datagram");
                                continue;
                            }
                        };
                        handle_datagram(&socket, &members, &events, &self_name, packet, src).await;
                    }
                }
            }
        });
    }

    fn spawn_gossip_tick(&self) {
        let socket = Arc::clone(&self.socket);
        let members = Arc::clone(&self.members);
        let self_name = self.config.node_name.clone();
        let seeds = self.config.seeds.clone();
        let fanout = self.config.fanout;
        let period = self.config.gossip_interval;
        let mut shutdown = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut tick = interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.recv() => return,
                    _ = tick.tick() => {
                        let (sample, peers) = {
                            let members = members.lock().expect("member table poisoned");
                            (heartbeat_sample(&members), members.alive_peers())
                        };

                        let heartbeat = Packet::Heartbeat {
                            from: self_name.clone(),
                            members: sample,
                        };
                        let Ok(bytes) = heartbeat.encode() else { continue };

                        if peers.is_empty() {
                            // Not joined yet (or alone): court the seeds.
                            for seed in &seeds {
                                let _ = socket.send_to(&bytes, seed).await;
                            }
                            continue;
                        }

                        let chosen: Vec<Member> = {
                            let mut rng = rand::thread_rng();
                            peers.choose_multiple(&mut rng, fanout).cloned().collect()
                        };
                        for peer in chosen {
                            if let Err(e) = socket.send_to(&bytes, peer.addr).await {
                                debug!(peer = %peer.name, error = %e, "heartbeat send failed");
                            }
                        }
                    }
                }
            }
        });
    }

    fn spawn_probe_tick(&self) {
        let members = Arc::clone(&self.members);
        let events = self.events.clone();
        let suspicion = self.config.suspicion_window();
        let period = self.config.probe_interval;
        let mut shutdown = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut tick = interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.recv() => return,
                    _ = tick.tick() => {
                        let produced = members
                            .lock()
                            .expect("member table poisoned")
                            .sweep(suspicion);
                        for event in produced {
                            events.push(event);
                        }
                    }
                }
            }
        });
    }

    fn spawn_broadcast_sender(&self, mut outbound_rx: mpsc::UnboundedReceiver<OutboundEvent>) {
        let socket = Arc::clone(&self.socket);
        let members = Arc::clone(&self.members);
        let self_name = self.config.node_name.clone();
        let queue_depth = Arc::clone(&self.queue_depth);
        let mut shutdown = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => return,
                    event = outbound_rx.recv() => {
                        let Some(event) = event else { return };

                        let peers = {
                            let members = members.lock().expect("member table poisoned");
                            members.alive_peers()
                        };

                        let packet = Packet::UserEvent {
                            from: self_name.clone(),
                            name: event.name,
                            payload: event.payload.to_vec(),
                        };
                        if let Ok(bytes) = packet.encode() {
                            for peer in peers {
                                if let Err(e) = socket.send_to(&bytes, peer.addr).await {
                                    debug!(peer = %peer.name, error = %e, "user-event send failed");
                                }
                            }
                        }

                        queue_depth.fetch_sub(1, Ordering::Relaxed);
                    }
                }
            }
        });
    }

    fn spawn_query_listener(&self, listener: TcpListener) {
        let events = self.events.clone();
        let self_name = self.config.node_name.clone();
        let mut shutdown = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => return,
                    accepted = listener.accept() => {
                        let (stream, peer) = match accepted {
                            Ok(pair) => pair,
                            Err(e) => {
                                warn!(error = %e, "query accept failed");
                                continue;
                            }
                        };
                        let events = events.clone();
                        let self_name = self_name.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_query(stream, &events, &self_name).await {
                                debug!(%peer, error = %e, "query connection ended");
                            }
                        });
                    }
                }
            }
        });
    }
}

/// Picks a bounded member sample for a heartbeat.
fn heartbeat_sample(members: &MemberTable) -> Vec<Member> {
    let mut sample = members.snapshot();
    let mut rng = rand::thread_rng();
    sample.shuffle(&mut rng);
    sample.truncate(HEARTBEAT_SAMPLE);
    sample
}

/// Applies one inbound datagram to the member table and the event queue.
async fn handle_datagram(
    socket: &Arc<UdpSocket>,
    members: &Arc<Mutex<MemberTable>>,
    events: &EventQueue,
    self_name: &str,
    packet: Packet,
    src: SocketAddr,
) {
    match packet {
        Packet::Heartbeat { from, members: sample } => {
            if from == self_name {
                return;
            }
            let (produced, ack) = {
                let mut table = members.lock().expect("member table poisoned");
                let mut produced = Vec::new();
                produced.extend(table.observe_direct(&from, src));
                produced.extend(table.merge_sample(sample));
                let ack = Packet::HeartbeatAck {
                    from: self_name.to_string(),
                    members: heartbeat_sample(&table),
                };
                (produced, ack)
            };
            for event in produced {
                events.push(event);
            }
            if let Ok(bytes) = ack.encode() {
                let _ = socket.send_to(&bytes, src).await;
            }
        }
        Packet::HeartbeatAck { from, members: sample } => {
            if from == self_name {
                return;
            }
            let produced = {
                let mut table = members.lock().expect("member table poisoned");
                let mut produced = Vec::new();
                produced.extend(table.observe_direct(&from, src));
                produced.extend(table.merge_sample(sample));
                produced
            };
            for event in produced {
                events.push(event);
            }
        }
        Packet::Leave { from } => {
            if from == self_name {
                return;
            }
            let produced = members
                .lock()
                .expect("member table poisoned")
                .observe_leave(&from);
            if let Some(event) = produced {
                events.push(event);
            }
        }
        Packet::UserEvent { from, name, payload } => {
            if from == self_name {
                return;
            }
            let produced = members
                .lock()
                .expect("member table poisoned")
                .observe_direct(&from, src);
            if let Some(event) = produced {
                events.push(event);
            }
            events.push(InboundEvent::UserEvent {
                from,
                name,
                payload: payload.into(),
            });
        }
    }
}

/// Server half of one query exchange.
async fn serve_query(mut stream: TcpStream, events: &EventQueue, self_name: &str) -> Result<()> {
    let mut buf = BytesMut::with_capacity(4096);

    let frame = loop {
        if let Some(frame) = Frame::decode(&mut buf)? {
            break frame;
        }
        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            // Peer went away before sending a full query.
            return Ok(());
        }
    };

    let query: QueryFrame = postcard::from_bytes(&frame.payload)?;
    let (handle, reply_rx) = QueryHandle::new();

    events.push(InboundEvent::Query {
        from: query.from,
        name: query.name,
        payload: query.payload.into(),
        handle,
    });

    // The handler may drop the handle without responding; that closes the
    // exchange with nothing written.
    let Ok(payload) = reply_rx.await else {
        return Ok(());
    };

    let response = ResponseFrame {
        from: self_name.to_string(),
        payload: payload.to_vec(),
    };
    let mut out = BytesMut::new();
    Frame::new(postcard::to_allocvec(&response)?)?.encode(&mut out);
    stream.write_all(&out).await?;
    stream.flush().await?;
    Ok(())
}

/// Client half of one query exchange.
async fn query_exchange(addr: SocketAddr, query: QueryFrame) -> Result<Option<ResponseFrame>> {
    let mut stream = TcpStream::connect(addr).await?;

    let mut out = BytesMut::new();
    Frame::new(postcard::to_allocvec(&query)?)?.encode(&mut out);
    stream.write_all(&out).await?;
    stream.flush().await?;

    let mut buf = BytesMut::with_capacity(4096);
    loop {
        if let Some(frame) = Frame::decode(&mut buf)? {
            let response: ResponseFrame = postcard::from_bytes(&frame.payload)?;
            return Ok(Some(response));
        }
        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
    }
}
