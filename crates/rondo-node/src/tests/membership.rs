//! Join, graceful leave, and identity-collision handling.

use std::sync::Arc;
use std::time::Duration;

use rondo_types::{between_right_inc, NodeId};

use crate::error::NodeError;
use crate::node::{Node, NodeConfig};
use crate::observer::NoopObserver;

use super::helpers::{
    await_ring, fast_config, key_in_arc, kv, reserve_addr, start_node, start_node_at,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_node_join_forms_a_ring_and_moves_keys() {
    let a = start_node(None).await;

    // Know the joiner's identity up front so a key can be planted in
    // its future share of the keyspace.
    let b_addr = reserve_addr().await;
    let b_id = NodeId::hash(b_addr.as_bytes());

    let moving_key = key_in_arc(a.id(), b_id);
    let staying_key = key_in_arc(b_id, a.id());
    a.save(kv(moving_key.clone(), b"moves")).await.unwrap();
    a.save(kv(staying_key.clone(), b"stays")).await.unwrap();

    let b = start_node_at(&b_addr, Some(a.addr())).await;

    await_ring(&[&a, &b], Duration::from_secs(10)).await;

    // The joiner received its share during the join handoff.
    assert!(b.local_keys().await.contains(&moving_key));
    assert!(a.local_keys().await.contains(&staying_key));
    assert!(!a.local_keys().await.contains(&moving_key));

    // Both keys readable through either node.
    assert_eq!(a.retrieve(&moving_key).await.unwrap(), b"moves");
    assert_eq!(b.retrieve(&staying_key).await.unwrap(), b"stays");

    b.stop().await;
    a.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn graceful_leave_hands_keys_to_successor_and_splices_ring() {
    let first = start_node(None).await;
    let second = start_node(Some(first.addr())).await;
    let third = start_node(Some(first.addr())).await;

    let mut nodes = vec![first, second, third];
    nodes.sort_by_key(|n| n.id());
    let c = nodes.pop().unwrap();
    let b = nodes.pop().unwrap();
    let a = nodes.pop().unwrap();

    await_ring(&[&a, &b, &c], Duration::from_secs(15)).await;

    // One key guaranteed to live on the departing node, plus a spread.
    let b_key = key_in_arc(a.id(), b.id());
    a.save(kv(b_key.clone(), b"payload")).await.unwrap();
    let mut all_keys = vec![b_key];
    for i in 0..30 {
        let key = format!("spread-{i}");
        a.save(kv(key.clone(), b"payload")).await.unwrap();
        all_keys.push(key);
    }

    let held_by_b = b.local_keys().await;
    assert!(!held_by_b.is_empty());

    b.stop().await;

    // The handoff completed before stop returned: every pair the
    // departing node held is on its successor now.
    let on_c = c.local_keys().await;
    for key in &held_by_b {
        assert!(on_c.contains(key), "key {key} was not handed to the successor");
    }

    await_ring(&[&a, &c], Duration::from_secs(10)).await;

    for key in &all_keys {
        assert_eq!(a.retrieve(key).await.unwrap(), b"payload");
    }

    c.stop().await;
    a.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_identity_is_rejected_at_join() {
    let a = start_node(None).await;

    // Fresh socket, but advertising the existing node's address and
    // therefore colliding on id.
    let config = NodeConfig {
        advertise_addr: Some(a.addr().to_string()),
        join_addr: Some(a.addr().to_string()),
        ..fast_config()
    };
    let err = Node::start(config, Arc::new(NoopObserver))
        .await
        .expect_err("join with a duplicate id must fail");
    assert!(
        matches!(err, NodeError::NodeAlreadyExists { .. }),
        "unexpected error: {err}"
    );

    a.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn occupied_port_fails_with_unable_to_listen() {
    let a = start_node(None).await;

    let config = NodeConfig {
        listen_addr: a.addr().to_string(),
        ..fast_config()
    };
    let err = Node::start(config, Arc::new(NoopObserver))
        .await
        .expect_err("binding an occupied port must fail");
    assert!(
        matches!(err, NodeError::UnableToListen { .. }),
        "unexpected error: {err}"
    );

    a.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn keys_spread_by_ownership_after_join() {
    let a = start_node(None).await;
    for i in 0..40 {
        a.save(kv(format!("scatter-{i}"), b"x")).await.unwrap();
    }

    let b = start_node(Some(a.addr())).await;
    await_ring(&[&a, &b], Duration::from_secs(10)).await;

    // Every key sits exactly where the placement rule says.
    let on_a = a.local_keys().await;
    let on_b = b.local_keys().await;
    for i in 0..40 {
        let key = format!("scatter-{i}");
        let hash = NodeId::hash(key.as_bytes());
        let belongs_to_b = between_right_inc(hash, a.id(), b.id());
        assert_eq!(on_b.contains(&key), belongs_to_b, "misplaced {key}");
        assert_eq!(on_a.contains(&key), !belongs_to_b, "misplaced {key}");
    }

    b.stop().await;
    a.stop().await;
}
