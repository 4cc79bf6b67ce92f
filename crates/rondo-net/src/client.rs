//! Outbound RPC: connection pool and the typed peer handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rondo_types::{KeyValue, NodeId};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::codec::{read_frame, write_frame};
use crate::error::NetError;
use crate::message::{Request, Response};

/// One pooled TCP connection. Calls are unary, so a mutex serializes
/// frame exchanges on the stream.
struct Connection {
    stream: Mutex<TcpStream>,
}

impl Connection {
    async fn call(&self, request: &Request) -> Result<Response, NetError> {
        let mut stream = self.stream.lock().await;
        write_frame(&mut *stream, request).await?;
        read_frame(&mut *stream).await
    }
}

/// Outbound connection manager.
///
/// Connections are cached per address and reused across calls. A call
/// that fails on a pooled connection evicts it, so the next call
/// dials fresh; peers are only ever identified by address string.
#[derive(Default)]
pub struct Dialer {
    pool: RwLock<HashMap<String, Arc<Connection>>>,
}

impl Dialer {
    /// Create an empty dialer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a handle to the peer at `addr`, dialing now if no live
    /// connection is pooled. Dial failure is [`NetError::UnableToDial`].
    pub async fn peer(&self, addr: &str) -> Result<PeerClient<'_>, NetError> {
        self.connection(addr).await?;
        Ok(PeerClient {
            dialer: self,
            addr: addr.to_string(),
        })
    }

    /// [`Dialer::peer`] with the bounded retry policy: up to
    /// `attempts` dials, `interval` apart. Only dial failures are
    /// retried; anything else surfaces immediately.
    pub async fn peer_with_retry(
        &self,
        addr: &str,
        attempts: u32,
        interval: Duration,
    ) -> Result<PeerClient<'_>, NetError> {
        let mut tries_left = attempts.max(1);
        loop {
            match self.peer(addr).await {
                Ok(peer) => return Ok(peer),
                Err(e) if e.is_unable_to_dial() && tries_left > 1 => {
                    tries_left -= 1;
                    trace!(addr, tries_left, "redialing rpc server");
                    tokio::time::sleep(interval).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Drop every pooled connection.
    pub async fn close(&self) {
        self.pool.write().await.clear();
    }

    async fn connection(&self, addr: &str) -> Result<Arc<Connection>, NetError> {
        {
            let pool = self.pool.read().await;
            if let Some(conn) = pool.get(addr) {
                return Ok(conn.clone());
            }
        }

        debug!(addr, "dialing rpc server");
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| NetError::UnableToDial {
                addr: addr.to_string(),
                source,
            })?;
        stream.set_nodelay(true).ok();

        let conn = Arc::new(Connection {
            stream: Mutex::new(stream),
        });
        self.pool
            .write()
            .await
            .insert(addr.to_string(), conn.clone());
        Ok(conn)
    }

    async fn evict(&self, addr: &str) {
        self.pool.write().await.remove(addr);
    }

    /// One full round trip to `addr`, evicting the pooled connection
    /// on failure and unwrapping remote faults into [`NetError::Fault`].
    async fn call(&self, addr: &str, request: &Request) -> Result<Response, NetError> {
        let conn = self.connection(addr).await?;
        match conn.call(request).await {
            Ok(Response::Fault { kind, message }) => Err(NetError::Fault {
                addr: addr.to_string(),
                kind,
                message,
            }),
            Ok(response) => Ok(response),
            Err(e) => {
                self.evict(addr).await;
                Err(e)
            }
        }
    }
}

/// A remote node, seen through its wire surface.
///
/// Thin value handle over the dialer's pool: methods are named after
/// the wire operations and hide request/response plumbing. Nothing
/// about the peer is retained beyond its address.
pub struct PeerClient<'a> {
    dialer: &'a Dialer,
    /// The peer's listen address.
    pub addr: String,
}

impl std::fmt::Debug for PeerClient<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerClient").field("addr", &self.addr).finish()
    }
}

impl PeerClient<'_> {
    async fn call(&self, request: Request) -> Result<Response, NetError> {
        self.dialer.call(&self.addr, &request).await
    }

    /// Find the successor of `id`, possibly recursing through the
    /// peer's own routing table.
    pub async fn successor(&self, id: NodeId) -> Result<String, NetError> {
        match self.call(Request::Successor { id }).await? {
            Response::Successor { addr } => Ok(addr),
            _ => Err(NetError::UnexpectedResponse { method: "Successor" }),
        }
    }

    /// Fetch the peer's identifier.
    pub async fn get_id(&self) -> Result<NodeId, NetError> {
        match self.call(Request::GetId).await? {
            Response::Id { id } => Ok(id),
            _ => Err(NetError::UnexpectedResponse { method: "GetId" }),
        }
    }

    /// Fetch the peer's predecessor address. A peer without one
    /// answers with a [`FaultKind::NilPredecessor`] fault.
    ///
    /// [`FaultKind::NilPredecessor`]: crate::FaultKind::NilPredecessor
    pub async fn get_predecessor(&self) -> Result<String, NetError> {
        match self.call(Request::GetPredecessor).await? {
            Response::Predecessor { addr } => Ok(addr),
            _ => Err(NetError::UnexpectedResponse {
                method: "GetPredecessor",
            }),
        }
    }

    /// Tell the peer we may be its predecessor.
    pub async fn notify(&self, addr: String) -> Result<(), NetError> {
        match self.call(Request::Notify { addr }).await? {
            Response::Ack => Ok(()),
            _ => Err(NetError::UnexpectedResponse { method: "Notify" }),
        }
    }

    /// Liveness probe with a hard deadline covering the whole round
    /// trip. Expiry is [`NetError::FailedToReach`].
    pub async fn check(&self, deadline: Duration) -> Result<String, NetError> {
        let call = self.call(Request::Check);
        match tokio::time::timeout(deadline, call).await {
            Err(_) => Err(NetError::FailedToReach {
                addr: self.addr.clone(),
            }),
            Ok(Ok(Response::Checked { reply })) => Ok(reply),
            Ok(Ok(_)) => Err(NetError::UnexpectedResponse { method: "Check" }),
            Ok(Err(e)) => Err(e),
        }
    }

    /// Merge a batch of pairs into the peer's store.
    pub async fn set_data(&self, data: HashMap<String, Vec<u8>>) -> Result<(), NetError> {
        match self.call(Request::SetData { data }).await? {
            Response::Ack => Ok(()),
            _ => Err(NetError::UnexpectedResponse { method: "SetData" }),
        }
    }

    /// Fetch a value from the peer's local store.
    pub async fn get_value(&self, key: String) -> Result<Vec<u8>, NetError> {
        match self.call(Request::GetValue { key }).await? {
            Response::Value { value } => Ok(value),
            _ => Err(NetError::UnexpectedResponse { method: "GetValue" }),
        }
    }

    /// Ask the peer to hand off to `to` the pairs that belong there.
    pub async fn transfer_data(&self, to: String) -> Result<(), NetError> {
        match self.call(Request::TransferData { to }).await? {
            Response::Ack => Ok(()),
            _ => Err(NetError::UnexpectedResponse {
                method: "TransferData",
            }),
        }
    }

    /// Point the peer's successor at `addr`.
    pub async fn set_successor(&self, addr: String) -> Result<(), NetError> {
        match self.call(Request::SetSuccessor { addr }).await? {
            Response::Ack => Ok(()),
            _ => Err(NetError::UnexpectedResponse {
                method: "SetSuccessor",
            }),
        }
    }

    /// Point the peer's predecessor at `addr`.
    pub async fn set_predecessor(&self, addr: String) -> Result<(), NetError> {
        match self.call(Request::SetPredecessor { addr }).await? {
            Response::Ack => Ok(()),
            _ => Err(NetError::UnexpectedResponse {
                method: "SetPredecessor",
            }),
        }
    }

    /// Store a pair somewhere on the ring, via this peer. Returns the
    /// address of the node the pair landed on.
    pub async fn save(&self, kv: KeyValue) -> Result<String, NetError> {
        match self.call(Request::Save { kv }).await? {
            Response::Saved { addr } => Ok(addr),
            _ => Err(NetError::UnexpectedResponse { method: "Save" }),
        }
    }

    /// Fetch a value from the ring, via this peer.
    pub async fn retrieve(&self, key: String) -> Result<Vec<u8>, NetError> {
        match self.call(Request::Retrieve { key }).await? {
            Response::Retrieved { value } => Ok(value),
            _ => Err(NetError::UnexpectedResponse { method: "Retrieve" }),
        }
    }
}
