//! Two-node bus integration: join, events, queries, failure detection.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::timeout;

use hypercore_gossip::{GossipBus, GossipConfig, InboundEvent, QueryParams};

fn fast_config(name: &str) -> GossipConfig {
    let mut config = GossipConfig::new(name, "127.0.0.1:0".parse().unwrap());
    config.gossip_interval = Duration::from_millis(50);
    config.probe_interval = Duration::from_millis(100);
    config.suspicion_multiplier = 3;
    config
}

async fn two_joined_buses() -> (GossipBus, GossipBus) {
    let a = GossipBus::start(fast_config("node-a")).await.unwrap();
    let b_config = fast_config("node-b").with_seeds(vec![a.local_addr()]);
    let b = GossipBus::start(b_config).await.unwrap();

    // Wait until both sides see each other as alive.
    timeout(Duration::from_secs(5), async {
        loop {
            if a.members().len() == 2 && b.members().len() == 2 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("nodes never joined");

    (a, b)
}

#[tokio::test]
async fn join_via_seed() {
    let (a, b) = two_joined_buses().await;

    let names: Vec<_> = a.members().into_iter().map(|m| m.name).collect();
    assert!(names.contains(&"node-a".to_string()));
    assert!(names.contains(&"node-b".to_string()));

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn user_event_reaches_peer() {
    let (a, b) = two_joined_buses().await;
    let b_events = b.events();

    a.broadcast_user_event("test_event", Bytes::from_static(b"payload"))
        .unwrap();

    let received = timeout(Duration::from_secs(5), async {
        loop {
            if let InboundEvent::UserEvent { from, name, payload } = b_events.recv().await {
                return (from, name, payload);
            }
        }
    })
    .await
    .expect("user event never arrived");

    assert_eq!(received.0, "node-a");
    assert_eq!(received.1, "test_event");
    assert_eq!(received.2, Bytes::from_static(b"payload"));

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn oversized_user_event_rejected() {
    let a = GossipBus::start(fast_config("node-a")).await.unwrap();
    let payload = Bytes::from(vec![0u8; 1024 * 1024]);
    assert!(a.broadcast_user_event("too_big", payload).is_err());
    a.shutdown().await;
}

#[tokio::test]
async fn query_round_trip() {
    let (a, b) = two_joined_buses().await;
    let b_events = b.events();

    // Node B answers queries by echoing the payload reversed.
    tokio::spawn(async move {
        loop {
            if let InboundEvent::Query { payload, handle, .. } = b_events.recv().await {
                let mut reversed = payload.to_vec();
                reversed.reverse();
                handle.respond(reversed.into());
            }
        }
    });

    let mut responses = a.query(
        "echo",
        Bytes::from_static(b"abc"),
        QueryParams::to_node("node-b").with_timeout(Duration::from_secs(5)),
    );

    let response = timeout(Duration::from_secs(5), responses.recv())
        .await
        .expect("query timed out")
        .expect("no response");

    assert_eq!(response.from, "node-b");
    assert_eq!(response.payload, Bytes::from_static(b"cba"));

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn self_query_is_served() {
    let a = GossipBus::start(fast_config("node-a")).await.unwrap();
    let events = a.events();

    tokio::spawn(async move {
        loop {
            if let InboundEvent::Query { payload, handle, .. } = events.recv().await {
                handle.respond(payload);
            }
        }
    });

    let mut responses = a.query(
        "echo",
        Bytes::from_static(b"self"),
        QueryParams::to_node("node-a").with_timeout(Duration::from_secs(5)),
    );

    let response = timeout(Duration::from_secs(5), responses.recv())
        .await
        .expect("self query timed out")
        .expect("no self response");
    assert_eq!(response.payload, Bytes::from_static(b"self"));

    a.shutdown().await;
}

#[tokio::test]
async fn unanswered_query_yields_empty_stream() {
    let (a, b) = two_joined_buses().await;
    let b_events = b.events();

    // Node B drops every query handle without responding.
    tokio::spawn(async move {
        loop {
            let event = b_events.recv().await;
            drop(event);
        }
    });

    let mut responses = a.query(
        "ignored",
        Bytes::new(),
        QueryParams::to_node("node-b").with_timeout(Duration::from_millis(500)),
    );

    let outcome = timeout(Duration::from_secs(5), responses.recv()).await;
    assert!(matches!(outcome, Ok(None)), "expected closed empty stream");

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn silent_peer_is_failed_then_reaped() {
    let (a, b) = two_joined_buses().await;
    let a_events = a.events();

    // Stop B without a leave announcement by shutting its tasks down and
    // dropping it; from A's view it simply goes silent.
    b.shutdown().await;
    drop(b);

    let failed = timeout(Duration::from_secs(10), async {
        loop {
            match a_events.recv().await {
                InboundEvent::MemberFailed(m) if m.name == "node-b" => return true,
                InboundEvent::MemberLeave(m) if m.name == "node-b" => return false,
                _ => {}
            }
        }
    })
    .await;

    // A leave datagram may win the race; both terminal outcomes are
    // acceptable, but the member must end up out of the alive set.
    let _ = failed;
    timeout(Duration::from_secs(10), async {
        loop {
            if a.members().iter().all(|m| m.name != "node-b"
                || m.status != hypercore_gossip::MemberStatus::Alive)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("node-b never left the alive set");

    a.shutdown().await;
}
