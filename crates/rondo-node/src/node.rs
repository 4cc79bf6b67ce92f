//! The node: per-ring state, the routing kernel, the protocol
//! methods peers invoke, and the start/join/stop lifecycle.
//!
//! Locking discipline: all mutable state sits behind one
//! readers/writer lock, and the lock is never held across an outbound
//! RPC. Every method below snapshots what it needs, releases the
//! lock, talks to the network, then re-acquires to commit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rondo_net::{serve, Dialer, FaultKind, NetError, RpcHandler};
use rondo_types::{between, between_right_inc, KeyValue, NodeId, Peer, M};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::NodeError;
use crate::maintenance;
use crate::observer::TopologyObserver;
use crate::store::KvStore;

/// How long `stop` waits for a background task to notice the shutdown
/// signal before aborting it.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Construction-time knobs for a node.
///
/// The maintenance defaults are the protocol's steady-state cadence;
/// tests shrink them to converge rings in milliseconds.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Address to bind the RPC listener on. A `:0` port is resolved
    /// after binding.
    pub listen_addr: String,
    /// Address peers should use to reach this node. Defaults to the
    /// bound address. The node's identifier is the SHA-1 of this
    /// string, so it must be unique per node.
    pub advertise_addr: Option<String>,
    /// Peer to bootstrap against. `None` creates a new ring of one.
    pub join_addr: Option<String>,
    /// Period of the successor-repair task.
    pub stabilize_interval: Duration,
    /// Period of the finger-repair task (one index per tick).
    pub fix_fingers_interval: Duration,
    /// Period of the predecessor liveness probe.
    pub check_predecessor_interval: Duration,
    /// Hard deadline on the liveness probe round trip.
    pub check_timeout: Duration,
    /// Attempts for the bounded dial retry.
    pub dial_retries: u32,
    /// Pause between dial retry attempts.
    pub dial_retry_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:4820".to_string(),
            advertise_addr: None,
            join_addr: None,
            stabilize_interval: Duration::from_secs(2),
            fix_fingers_interval: Duration::from_millis(100),
            check_predecessor_interval: Duration::from_secs(5),
            check_timeout: Duration::from_secs(5),
            dial_retries: 3,
            dial_retry_interval: Duration::from_secs(1),
        }
    }
}

/// The routing table: `M` finger slots, entry 0 being the successor.
///
/// Entry 0 is seeded with the node itself at construction and is
/// never cleared, only replaced; the other entries fill in lazily as
/// the finger-repair task walks the table.
pub(crate) struct FingerTable {
    entries: Vec<Option<Peer>>,
}

impl FingerTable {
    fn new(own: Peer) -> Self {
        let mut entries = vec![None; M];
        entries[0] = Some(own);
        Self { entries }
    }

    /// The immediate successor (finger 0).
    pub(crate) fn successor(&self) -> Peer {
        self.entries[0]
            .clone()
            .expect("finger 0 is seeded at construction and never cleared")
    }

    pub(crate) fn get(&self, i: usize) -> Option<&Peer> {
        self.entries[i].as_ref()
    }

    fn set(&mut self, i: usize, peer: Peer) {
        self.entries[i] = Some(peer);
    }
}

/// Everything mutable about a node, behind the single lock.
pub(crate) struct RingState {
    pub(crate) predecessor: Option<Peer>,
    pub(crate) fingers: FingerTable,
    pub(crate) store: KvStore,
}

/// One Chord node.
///
/// Shared behind an `Arc` by the RPC server, the three maintenance
/// tasks, and the owning [`NodeHandle`].
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) addr: String,
    pub(crate) state: RwLock<RingState>,
    pub(crate) dialer: Dialer,
    pub(crate) observer: Arc<dyn TopologyObserver>,
    pub(crate) shutdown: broadcast::Sender<()>,
    pub(crate) stopping: AtomicBool,
    pub(crate) config: NodeConfig,
}

impl Node {
    /// Bind, optionally join an existing ring, and start the RPC
    /// server plus the three maintenance tasks.
    ///
    /// Any failure here aborts startup before maintenance spawns: a
    /// half-started node never lingers.
    pub async fn start(
        config: NodeConfig,
        observer: Arc<dyn TopologyObserver>,
    ) -> Result<NodeHandle, NodeError> {
        let listener =
            TcpListener::bind(&config.listen_addr)
                .await
                .map_err(|source| NodeError::UnableToListen {
                    addr: config.listen_addr.clone(),
                    source,
                })?;
        let bound = listener
            .local_addr()
            .map_err(|source| NodeError::UnableToListen {
                addr: config.listen_addr.clone(),
                source,
            })?;

        let addr = config
            .advertise_addr
            .clone()
            .unwrap_or_else(|| bound.to_string());
        let id = NodeId::hash(addr.as_bytes());
        info!(%addr, id = %id.short(), "starting node");

        let (shutdown, _) = broadcast::channel(8);
        let own = Peer {
            id,
            addr: addr.clone(),
        };
        let node = Arc::new(Node {
            id,
            addr,
            state: RwLock::new(RingState {
                predecessor: None,
                fingers: FingerTable::new(own),
                store: KvStore::new(),
            }),
            dialer: Dialer::new(),
            observer,
            shutdown: shutdown.clone(),
            stopping: AtomicBool::new(false),
            config,
        });

        // The server must be up before joining: the successor pushes
        // our share of the keyspace back at us during the join.
        let handler: Arc<dyn RpcHandler> = node.clone();
        let server = tokio::spawn(serve(listener, handler, shutdown.subscribe()));

        if let Some(join_addr) = node.config.join_addr.clone() {
            if let Err(e) = node.join(&join_addr).await {
                let _ = shutdown.send(());
                server.abort();
                return Err(e);
            }
        }

        node.observe_save().await;
        let tasks = maintenance::spawn_all(&node);

        Ok(NodeHandle {
            node,
            server,
            tasks,
        })
    }

    async fn join(&self, join_addr: &str) -> Result<(), NodeError> {
        info!(via = join_addr, "joining ring");
        let bootstrap = self.dialer.peer(join_addr).await?;
        let succ_addr = bootstrap.successor(self.id).await?;

        let succ = self.dialer.peer(&succ_addr).await?;
        let succ_id = succ.get_id().await?;
        if succ_id == self.id {
            return Err(NodeError::NodeAlreadyExists { addr: succ_addr });
        }

        self.commit_successor(Peer {
            id: succ_id,
            addr: succ_addr,
        })
        .await;

        // Our share of the keyspace comes over before the ring knows
        // us; the first stabilize round delivers the notify.
        succ.transfer_data(self.addr.clone()).await?;
        Ok(())
    }

    // -------------------------------------------------------------------
    // Routing kernel
    // -------------------------------------------------------------------

    /// Find the address of the node that succeeds `id` on the ring.
    ///
    /// O(log N) hops on a correct ring: either `id` falls on our own
    /// successor arc, or the query is delegated to the closest
    /// preceding finger.
    pub(crate) async fn find_successor(&self, id: NodeId) -> Result<String, NodeError> {
        {
            let st = self.state.read().await;
            let succ = st.fingers.successor();
            if between_right_inc(id, self.id, succ.id) {
                return Ok(succ.addr);
            }
        }

        match self.closest_preceding_node(id).await {
            // Nothing precedes the target but us: we are the answer.
            None => Ok(self.addr.clone()),
            Some(addr) => {
                let peer = self.dialer.peer(&addr).await?;
                Ok(peer.successor(id).await?)
            }
        }
    }

    /// Scan the finger table from the top for the first reachable
    /// finger inside the open arc `(self.id, id)`. Unreachable
    /// fingers are skipped, not repaired here.
    async fn closest_preceding_node(&self, id: NodeId) -> Option<String> {
        let mut candidates: Vec<Peer> = {
            let st = self.state.read().await;
            (0..M)
                .rev()
                .filter_map(|i| st.fingers.get(i).cloned())
                .filter(|finger| between(finger.id, self.id, id))
                .collect()
        };
        candidates.dedup_by(|a, b| a.addr == b.addr);

        for finger in candidates {
            // A full round trip, not just a dial: a pooled connection
            // to a dead peer would pass a dial check.
            let reachable = match self.dialer.peer(&finger.addr).await {
                Ok(peer) => peer.get_id().await.is_ok(),
                Err(_) => false,
            };
            if reachable {
                return Some(finger.addr);
            }
        }
        None
    }

    // -------------------------------------------------------------------
    // Protocol methods (the RPC surface, minus transport plumbing)
    // -------------------------------------------------------------------

    /// Handle a peer's claim to be our predecessor.
    ///
    /// Accept iff the slot is empty or the caller sits strictly
    /// between the current predecessor and us. On accept, the
    /// caller's share of our keys is handed over before the slot is
    /// replaced.
    pub(crate) async fn notify(&self, caller_addr: String) -> Result<(), NodeError> {
        let caller = self.dialer.peer(&caller_addr).await?;
        let caller_id = caller.get_id().await?;
        if caller_id == self.id {
            // Our own advisory reflected back; nothing to learn.
            return Ok(());
        }

        let accept = {
            let st = self.state.read().await;
            match &st.predecessor {
                None => true,
                Some(pred) => between(caller_id, pred.id, self.id),
            }
        };
        if !accept {
            return Ok(());
        }

        if let Err(e) = self.transfer_data(&caller_addr, Some(caller_id)).await {
            // The pointer update still goes ahead; the pairs stay here
            // and move on a later notify or transfer.
            warn!(to = %caller_addr, error = %e, "key handoff to new predecessor failed");
        }

        let mut st = self.state.write().await;
        // The slot may have changed while the lock was released; the
        // acceptance rule is re-checked against the current holder.
        let still_accept = match &st.predecessor {
            None => true,
            Some(pred) => between(caller_id, pred.id, self.id),
        };
        if still_accept {
            debug!(predecessor = %caller_addr, "adopting predecessor");
            st.predecessor = Some(Peer {
                id: caller_id,
                addr: caller_addr,
            });
        }
        Ok(())
    }

    /// Merge a batch of pairs into the local store.
    pub(crate) async fn set_data(&self, data: HashMap<String, Vec<u8>>) {
        debug!(pairs = data.len(), "merging data batch");
        let mut st = self.state.write().await;
        st.store.set_batch(data);
    }

    /// Look up a key held locally.
    pub(crate) async fn get_value(&self, key: &str) -> Result<Vec<u8>, NodeError> {
        let st = self.state.read().await;
        st.store
            .get(key)
            .cloned()
            .ok_or_else(|| NodeError::NoKeyValuePair {
                key: key.to_string(),
            })
    }

    /// Hand off to `to` every pair that belongs there, deleting local
    /// copies once the batch is acknowledged.
    ///
    /// A stopping node hands off everything. Otherwise the pairs that
    /// leave are exactly those whose hashes fall outside
    /// `(to.id, self.id]` — the arc that stops being ours once `to`
    /// sits in front of us.
    pub(crate) async fn transfer_data(
        &self,
        to: &str,
        known_id: Option<NodeId>,
    ) -> Result<(), NodeError> {
        let peer = self.dialer.peer(to).await?;
        let to_id = match known_id {
            Some(id) => id,
            None => {
                let succ = { self.state.read().await.fingers.successor() };
                if succ.addr == to {
                    succ.id
                } else {
                    peer.get_id().await?
                }
            }
        };

        let (del_keys, batch) = {
            let st = self.state.read().await;
            if self.stopping.load(Ordering::SeqCst) {
                st.store.partition(|_| true)
            } else {
                st.store.partition(|key| {
                    !between_right_inc(NodeId::hash(key.as_bytes()), to_id, self.id)
                })
            }
        };

        if batch.is_empty() {
            return Ok(());
        }

        info!(to, pairs = batch.len(), "transferring data");
        peer.set_data(batch).await?;

        let mut st = self.state.write().await;
        st.store.remove_keys(&del_keys);
        Ok(())
    }

    /// Point our successor at `addr` (used by a departing successor).
    /// Our own address collapses the pointer back to self.
    pub(crate) async fn set_successor(&self, addr: String) -> Result<(), NodeError> {
        if addr == self.addr {
            self.adopt_self_successor().await;
            return Ok(());
        }
        let peer = self.dialer.peer(&addr).await?;
        let id = peer.get_id().await?;
        self.commit_successor(Peer { id, addr }).await;
        Ok(())
    }

    /// Point our predecessor at `addr` (used by a departing
    /// predecessor). Our own address clears the slot instead.
    pub(crate) async fn set_predecessor(&self, addr: String) -> Result<(), NodeError> {
        if addr == self.addr {
            self.clear_predecessor().await;
            return Ok(());
        }
        let peer = self.dialer.peer(&addr).await?;
        let id = peer.get_id().await?;
        let mut st = self.state.write().await;
        st.predecessor = Some(Peer { id, addr });
        Ok(())
    }

    /// Empty the predecessor slot.
    pub(crate) async fn clear_predecessor(&self) {
        let mut st = self.state.write().await;
        if st.predecessor.take().is_some() {
            debug!("cleared predecessor");
        }
    }

    // -------------------------------------------------------------------
    // Client-facing operations
    // -------------------------------------------------------------------

    /// Route a pair to the node that owns its key and store it there.
    /// Returns the storing node's address.
    pub(crate) async fn save(&self, kv: KeyValue) -> Result<String, NodeError> {
        let key_hash = NodeId::hash(kv.key.as_bytes());
        let rounds = self.config.dial_retries.max(1);
        let mut round = 0;

        loop {
            round += 1;
            let target = self.find_successor(key_hash).await?;
            let dialed = self
                .dialer
                .peer_with_retry(
                    &target,
                    self.config.dial_retries,
                    self.config.dial_retry_interval,
                )
                .await;
            match dialed {
                Ok(peer) => {
                    let batch = HashMap::from([(kv.key.clone(), kv.value.clone())]);
                    peer.set_data(batch).await?;
                    info!(key = %kv.key, stored_on = %target, "pair saved");
                    return Ok(target);
                }
                Err(e) if e.is_unable_to_dial() && round < rounds => {
                    // The owner may have just left; route again.
                    warn!(addr = %target, "storing node unreachable, re-routing");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Route to the owner of `key` and fetch the value. A miss comes
    /// back as the error string in value position, preserving the
    /// wire signature.
    pub(crate) async fn retrieve(&self, key: &str) -> Result<Vec<u8>, NodeError> {
        let target = self.find_successor(NodeId::hash(key.as_bytes())).await?;
        let peer = self.dialer.peer(&target).await?;
        match peer.get_value(key.to_string()).await {
            Ok(value) => Ok(value),
            Err(NetError::Fault {
                kind: FaultKind::NoKeyValuePair,
                message,
                ..
            }) => Ok(message.into_bytes()),
            Err(e) => Err(e.into()),
        }
    }

    // -------------------------------------------------------------------
    // Successor bookkeeping
    // -------------------------------------------------------------------

    /// Replace finger 0, reporting the change to the topology
    /// observer when the entry actually moved.
    pub(crate) async fn commit_successor(&self, peer: Peer) -> bool {
        let changed = {
            let mut st = self.state.write().await;
            let changed = st.fingers.successor() != peer;
            if changed {
                info!(successor = %peer, "successor updated");
            }
            st.fingers.set(0, peer.clone());
            changed
        };
        if changed {
            self.observe_update(peer.addr);
        }
        changed
    }

    /// Fall back to being our own successor (the successor is gone
    /// and nothing better is known yet).
    pub(crate) async fn adopt_self_successor(&self) {
        let own = Peer {
            id: self.id,
            addr: self.addr.clone(),
        };
        self.commit_successor(own).await;
    }

    /// Write finger `i`; index 0 routes through successor
    /// bookkeeping.
    pub(crate) async fn commit_finger(&self, i: usize, peer: Peer) {
        if i == 0 {
            self.commit_successor(peer).await;
            return;
        }
        let mut st = self.state.write().await;
        st.fingers.set(i, peer);
    }

    // -------------------------------------------------------------------
    // Observer plumbing
    // -------------------------------------------------------------------

    /// Fire-and-forget successor-change record.
    fn observe_update(&self, successor_addr: String) {
        let observer = self.observer.clone();
        let own = self.addr.clone();
        tokio::task::spawn_blocking(move || observer.update(&own, &successor_addr));
    }

    /// Insert-on-create record; awaited, start is not a hot path.
    async fn observe_save(&self) {
        let observer = self.observer.clone();
        let own = self.addr.clone();
        let succ = { self.state.read().await.fingers.successor().addr };
        let _ = tokio::task::spawn_blocking(move || observer.save(&own, &succ)).await;
    }

    /// Delete-on-stop record; completes before `stop` returns.
    async fn observe_delete(&self) {
        let observer = self.observer.clone();
        let own = self.addr.clone();
        let _ = tokio::task::spawn_blocking(move || observer.delete(&own)).await;
    }
}

/// Owning handle to a started node.
///
/// Exposes the client operations plus read-side accessors, and the
/// two ways a node ends: [`stop`](NodeHandle::stop) (graceful leave)
/// and [`abort`](NodeHandle::abort) (ungraceful, for failure
/// injection).
pub struct NodeHandle {
    node: Arc<Node>,
    server: JoinHandle<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.node.id)
            .field("addr", &self.node.addr)
            .finish()
    }
}

impl NodeHandle {
    /// This node's ring identifier.
    pub fn id(&self) -> NodeId {
        self.node.id
    }

    /// This node's advertised address.
    pub fn addr(&self) -> &str {
        &self.node.addr
    }

    /// Current successor pointer.
    pub async fn successor(&self) -> Peer {
        self.node.state.read().await.fingers.successor()
    }

    /// Current predecessor pointer, if known.
    pub async fn predecessor(&self) -> Option<Peer> {
        self.node.state.read().await.predecessor.clone()
    }

    /// Store a pair on the ring. Returns the storing node's address.
    pub async fn save(&self, kv: KeyValue) -> Result<String, NodeError> {
        self.node.save(kv).await
    }

    /// Fetch a value from the ring.
    pub async fn retrieve(&self, key: &str) -> Result<Vec<u8>, NodeError> {
        self.node.retrieve(key).await
    }

    /// Keys held locally right now.
    pub async fn local_keys(&self) -> Vec<String> {
        self.node.state.read().await.store.keys()
    }

    /// Graceful departure: stop maintenance, hand every pair to the
    /// successor, splice predecessor and successor together, record
    /// the departure, and tear the transport down.
    pub async fn stop(self) {
        let NodeHandle {
            node,
            server,
            tasks,
        } = self;
        info!(addr = %node.addr, "stopping node");

        node.stopping.store(true, Ordering::SeqCst);
        let _ = node.shutdown.send(());

        let (succ, pred) = {
            let st = node.state.read().await;
            (st.fingers.successor(), st.predecessor.clone())
        };

        if succ.id != node.id {
            if let Err(e) = node.transfer_data(&succ.addr, Some(succ.id)).await {
                warn!(error = %e, "key handoff during stop failed");
            }
            if let Some(pred) = pred {
                match node.dialer.peer(&pred.addr).await {
                    Ok(peer) => {
                        if let Err(e) = peer.set_successor(succ.addr.clone()).await {
                            warn!(error = %e, "could not re-point predecessor");
                        }
                    }
                    Err(e) => warn!(error = %e, "predecessor unreachable during stop"),
                }
                match node.dialer.peer(&succ.addr).await {
                    Ok(peer) => {
                        if let Err(e) = peer.set_predecessor(pred.addr.clone()).await {
                            warn!(error = %e, "could not re-point successor");
                        }
                    }
                    Err(e) => warn!(error = %e, "successor unreachable during stop"),
                }
            }
        }

        node.observe_delete().await;

        for task in tasks {
            join_or_abort(task).await;
        }
        join_or_abort(server).await;
        node.dialer.close().await;
    }

    /// Tear the node down without the leave protocol: no handoff, no
    /// splice. Peers discover the absence through their own probes.
    pub fn abort(self) {
        let _ = self.node.shutdown.send(());
        for task in self.tasks {
            task.abort();
        }
        self.server.abort();
    }
}

async fn join_or_abort(mut task: JoinHandle<()>) {
    if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
        task.abort();
    }
}
