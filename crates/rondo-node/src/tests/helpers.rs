//! Shared test utilities for rondo-node tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rondo_types::{between_right_inc, KeyValue, NodeId};
use tokio::net::TcpListener;

use crate::node::{Node, NodeConfig, NodeHandle};
use crate::observer::NoopObserver;

/// Maintenance cadence shrunk so rings converge in well under a
/// second instead of minutes.
pub fn fast_config() -> NodeConfig {
    NodeConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        advertise_addr: None,
        join_addr: None,
        stabilize_interval: Duration::from_millis(50),
        fix_fingers_interval: Duration::from_millis(10),
        check_predecessor_interval: Duration::from_millis(100),
        check_timeout: Duration::from_millis(400),
        dial_retries: 2,
        dial_retry_interval: Duration::from_millis(50),
    }
}

/// Start a node on an ephemeral port, optionally joining `join`.
pub async fn start_node(join: Option<&str>) -> NodeHandle {
    let config = NodeConfig {
        join_addr: join.map(String::from),
        ..fast_config()
    };
    Node::start(config, Arc::new(NoopObserver))
        .await
        .expect("node should start")
}

/// Start a node bound to a specific address.
pub async fn start_node_at(listen_addr: &str, join: Option<&str>) -> NodeHandle {
    let config = NodeConfig {
        listen_addr: listen_addr.to_string(),
        join_addr: join.map(String::from),
        ..fast_config()
    };
    Node::start(config, Arc::new(NoopObserver))
        .await
        .expect("node should start")
}

/// Grab an ephemeral address and release it, so a node's identity is
/// known before the node exists.
pub async fn reserve_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}

/// Interval between convergence polls.
pub const POLL: Duration = Duration::from_millis(25);

/// Poll until the nodes form a correct ring, or panic at the
/// deadline.
pub async fn await_ring(nodes: &[&NodeHandle], deadline: Duration) {
    let start = Instant::now();
    loop {
        if ring_converged(nodes).await {
            return;
        }
        assert!(
            start.elapsed() < deadline,
            "timed out waiting for a {}-node ring",
            nodes.len()
        );
        tokio::time::sleep(POLL).await;
    }
}

/// Whether the nodes form a correct ring: sorted by id, every node's
/// successor is the next node and its predecessor the previous one.
/// Only meaningful for two or more nodes.
pub async fn ring_converged(nodes: &[&NodeHandle]) -> bool {
    let mut sorted: Vec<&NodeHandle> = nodes.to_vec();
    sorted.sort_by_key(|n| n.id());
    let n = sorted.len();

    for (i, node) in sorted.iter().enumerate() {
        let succ = sorted[(i + 1) % n];
        let pred = sorted[(i + n - 1) % n];
        if node.successor().await.id != succ.id() {
            return false;
        }
        match node.predecessor().await {
            Some(p) if p.id == pred.id() => {}
            _ => return false,
        }
    }
    true
}

/// Brute-force a key whose hash lands in the arc `(l, r]`.
pub fn key_in_arc(l: NodeId, r: NodeId) -> String {
    (0..1_000_000u32)
        .map(|i| format!("key-{i}"))
        .find(|key| between_right_inc(NodeId::hash(key.as_bytes()), l, r))
        .expect("no key found for arc; arc is vanishingly small")
}

pub fn kv(key: impl Into<String>, value: &[u8]) -> KeyValue {
    KeyValue {
        key: key.into(),
        value: value.to_vec(),
    }
}
