//! Failure detection: an ungraceful death is noticed by the liveness
//! probe and routed around by stabilization.

use std::time::{Duration, Instant};

use super::helpers::{await_ring, start_node, POLL};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dead_predecessor_is_cleared_and_ring_heals() {
    let first = start_node(None).await;
    let second = start_node(Some(first.addr())).await;
    let third = start_node(Some(first.addr())).await;

    let mut nodes = vec![first, second, third];
    nodes.sort_by_key(|n| n.id());
    let c = nodes.pop().unwrap();
    let b = nodes.pop().unwrap();
    let a = nodes.pop().unwrap();

    await_ring(&[&a, &b, &c], Duration::from_secs(15)).await;

    let b_id = b.id();
    // No leave protocol: the node just disappears.
    b.abort();

    // The dead node's successor notices through the liveness probe.
    let deadline = Instant::now() + Duration::from_secs(10);
    while c.predecessor().await.map(|p| p.id) == Some(b_id) {
        assert!(
            Instant::now() < deadline,
            "dead predecessor was never cleared"
        );
        tokio::time::sleep(POLL).await;
    }

    // Stabilization then routes around the gap entirely.
    await_ring(&[&a, &c], Duration::from_secs(10)).await;
    assert_eq!(a.successor().await.id, c.id());

    c.stop().await;
    a.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lone_survivor_falls_back_to_self() {
    let a = start_node(None).await;
    let b = start_node(Some(a.addr())).await;

    await_ring(&[&a, &b], Duration::from_secs(10)).await;

    b.abort();

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if a.successor().await.id == a.id() && a.predecessor().await.is_none() {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "survivor never fell back to itself"
        );
        tokio::time::sleep(POLL).await;
    }

    a.stop().await;
}
