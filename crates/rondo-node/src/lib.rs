//! The rondo node: a peer on a 160-bit Chord identifier ring.
//!
//! A [`Node`] owns its slice of the keyspace and cooperates with
//! peers to route lookups in O(log N) hops. This crate implements:
//!
//! - The per-node state (successor, predecessor, finger table, local
//!   key/value store) behind one readers/writer lock.
//! - The RPC surface peers call on each other, dispatched through
//!   the `rondo-net` handler seam.
//! - The three maintenance tasks (`stabilize`, `fix_fingers`,
//!   `check_predecessor`) that repair the ring after joins, leaves,
//!   and failures.
//! - Join and graceful-departure protocols, including key handoff.
//! - The [`TopologyObserver`] sink recording successor pointers for
//!   external inspection.
//!
//! Start a ring of one, then grow it:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use rondo_node::{Node, NodeConfig, NoopObserver};
//! # async fn demo() -> Result<(), rondo_node::NodeError> {
//! let first = Node::start(
//!     NodeConfig {
//!         listen_addr: "127.0.0.1:4820".into(),
//!         ..NodeConfig::default()
//!     },
//!     Arc::new(NoopObserver),
//! )
//! .await?;
//!
//! let second = Node::start(
//!     NodeConfig {
//!         listen_addr: "127.0.0.1:4821".into(),
//!         join_addr: Some(first.addr().to_string()),
//!         ..NodeConfig::default()
//!     },
//!     Arc::new(NoopObserver),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod handler;
mod maintenance;
mod node;
mod observer;
mod store;
#[cfg(test)]
mod tests;

pub use error::NodeError;
pub use node::{Node, NodeConfig, NodeHandle};
pub use observer::{NoopObserver, SqliteObserver, TopologyObserver};
