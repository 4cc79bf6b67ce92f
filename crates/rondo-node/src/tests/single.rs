//! A ring of one: save/retrieve against a lone node.

use super::helpers::{kv, start_node};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lone_node_is_its_own_successor() {
    let a = start_node(None).await;

    assert_eq!(a.successor().await.id, a.id());
    assert_eq!(a.successor().await.addr, a.addr());
    assert!(a.predecessor().await.is_none());

    a.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lone_node_save_and_retrieve() {
    let a = start_node(None).await;

    let stored_on = a.save(kv("k", b"v")).await.unwrap();
    assert_eq!(stored_on, a.addr());
    assert_eq!(a.retrieve("k").await.unwrap(), b"v");
    assert_eq!(a.local_keys().await, vec!["k".to_string()]);

    a.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn retrieve_miss_carries_the_error_string() {
    let a = start_node(None).await;

    let value = a.retrieve("never-stored").await.unwrap();
    let marker = String::from_utf8(value).unwrap();
    assert!(
        marker.contains("no key/value pair"),
        "unexpected miss marker: {marker}"
    );

    a.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn save_overwrites_existing_value() {
    let a = start_node(None).await;

    a.save(kv("k", b"first")).await.unwrap();
    a.save(kv("k", b"second")).await.unwrap();
    assert_eq!(a.retrieve("k").await.unwrap(), b"second");

    a.stop().await;
}
