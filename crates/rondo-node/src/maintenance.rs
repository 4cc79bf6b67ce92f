//! The three periodic tasks that pull the ring back into shape:
//! successor repair, finger repair, and predecessor liveness.
//!
//! Each task is an independent long-lived worker owning a ticker and
//! a shutdown receiver. They share nothing with each other; all
//! coordination goes through the node's lock and the RPC surface.
//! Failures inside a round are logged and the loop carries on —
//! convergence, not immediacy, is the contract.

use std::sync::Arc;

use rondo_net::{FaultKind, ACKNOWLEDGED};
use rondo_types::{between, finger_offset, Peer, M};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::NodeError;
use crate::node::Node;

/// Spawn the three maintenance workers for `node`.
pub(crate) fn spawn_all(node: &Arc<Node>) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(stabilize_loop(node.clone())),
        tokio::spawn(fix_fingers_loop(node.clone())),
        tokio::spawn(check_predecessor_loop(node.clone())),
    ]
}

// ---------------------------------------------------------------------------
// stabilize
// ---------------------------------------------------------------------------

async fn stabilize_loop(node: Arc<Node>) {
    let mut ticker = interval(node.config.stabilize_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut shutdown = node.shutdown.subscribe();

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {
                if let Err(e) = stabilize_once(&node).await {
                    debug!(error = %e, "stabilize round failed");
                }
            }
        }
    }
    debug!("stabilize task stopped");
}

/// One stabilization round: ask the successor for its predecessor
/// `x`; adopt `x` as successor if it sits between us; then notify.
/// The trailing notify is what keeps the ring pulling the correct
/// successor into place even on rounds where nothing changed.
async fn stabilize_once(node: &Node) -> Result<(), NodeError> {
    let succ = { node.state.read().await.fingers.successor() };

    let peer = match node
        .dialer
        .peer_with_retry(
            &succ.addr,
            node.config.dial_retries,
            node.config.dial_retry_interval,
        )
        .await
    {
        Ok(peer) => peer,
        Err(e) if e.is_unable_to_dial() => {
            warn!(successor = %succ, "successor unreachable, falling back to self");
            node.adopt_self_successor().await;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    match peer.get_predecessor().await {
        Ok(x_addr) => {
            let x_id = if x_addr == node.addr {
                node.id
            } else {
                let x_peer = node.dialer.peer(&x_addr).await?;
                x_peer.get_id().await?
            };

            if between(x_id, node.id, succ.id) {
                node.commit_successor(Peer {
                    id: x_id,
                    addr: x_addr.clone(),
                })
                .await;
            }

            // Notify whether or not the pointer moved; a self-notify
            // is absorbed by the acceptance rule on the other end.
            if x_addr != node.addr {
                let x_peer = node.dialer.peer(&x_addr).await?;
                x_peer.notify(node.addr.clone()).await?;
            }
            Ok(())
        }
        Err(e) if e.fault_kind() == Some(FaultKind::NilPredecessor) => {
            // The successor knows no predecessor yet: volunteer.
            if succ.id != node.id {
                peer.notify(node.addr.clone()).await?;
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// fix_fingers
// ---------------------------------------------------------------------------

async fn fix_fingers_loop(node: Arc<Node>) {
    let mut ticker = interval(node.config.fix_fingers_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut shutdown = node.shutdown.subscribe();
    let mut next = 0usize;

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {
                next = fix_finger(&node, next).await;
            }
        }
    }
    debug!("fix_fingers task stopped");
}

/// Repair finger `i` and return the index to fix next. A failed
/// round returns `i` unchanged so the same entry is retried on the
/// next tick.
async fn fix_finger(node: &Node, i: usize) -> usize {
    let target = finger_offset(node.id, i);

    let succ_addr = match node.find_successor(target).await {
        Ok(addr) => addr,
        Err(e) => {
            debug!(finger = i, error = %e, "finger lookup failed");
            return i;
        }
    };

    let succ_id = if succ_addr == node.addr {
        node.id
    } else {
        let peer = match node
            .dialer
            .peer_with_retry(
                &succ_addr,
                node.config.dial_retries,
                node.config.dial_retry_interval,
            )
            .await
        {
            Ok(peer) => peer,
            Err(e) => {
                debug!(finger = i, error = %e, "finger target unreachable");
                return i;
            }
        };
        match peer.get_id().await {
            Ok(id) => id,
            Err(e) => {
                debug!(finger = i, error = %e, "finger target id fetch failed");
                return i;
            }
        }
    };

    node.commit_finger(
        i,
        Peer {
            id: succ_id,
            addr: succ_addr,
        },
    )
    .await;

    (i + 1) % M
}

// ---------------------------------------------------------------------------
// check_predecessor
// ---------------------------------------------------------------------------

async fn check_predecessor_loop(node: Arc<Node>) {
    let mut ticker = interval(node.config.check_predecessor_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut shutdown = node.shutdown.subscribe();

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => check_predecessor_once(&node).await,
        }
    }
    debug!("check_predecessor task stopped");
}

/// Probe the predecessor with a hard deadline; anything but a prompt
/// acknowledgement clears the slot.
async fn check_predecessor_once(node: &Node) {
    let pred = { node.state.read().await.predecessor.clone() };
    let Some(pred) = pred else {
        return;
    };

    let probe = async {
        let peer = node.dialer.peer(&pred.addr).await?;
        peer.check(node.config.check_timeout).await
    };

    let alive = match tokio::time::timeout(node.config.check_timeout, probe).await {
        Ok(Ok(reply)) => reply == ACKNOWLEDGED,
        Ok(Err(_)) | Err(_) => false,
    };

    if !alive {
        warn!(predecessor = %pred, "predecessor failed, clearing slot");
        node.clear_predecessor().await;
    }
}
