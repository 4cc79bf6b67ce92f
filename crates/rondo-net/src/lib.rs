//! TCP request/response RPC for rondo nodes.
//!
//! This crate implements the wire surface peers call on each other:
//!
//! - [`Request`] / [`Response`] — the wire protocol (postcard-encoded,
//!   length-prefixed frames).
//! - [`Dialer`] — outbound side: connection pooling keyed by address,
//!   plus the bounded dial-retry used by routing-table repair.
//! - [`PeerClient`] — a typed remote-reference handle with one method
//!   per wire operation.
//! - [`serve`] — inbound side: accept loop dispatching decoded
//!   requests to an [`RpcHandler`].
//!
//! The handler seam keeps this crate ignorant of node semantics; the
//! node crate implements [`RpcHandler`] and the transport stays a dumb
//! pipe.

mod client;
mod codec;
mod error;
mod message;
mod server;

pub use client::{Dialer, PeerClient};
pub use codec::{read_frame, write_frame, MAX_FRAME_SIZE};
pub use error::NetError;
pub use message::{FaultKind, Request, Response};
pub use server::{serve, RpcHandler};

/// The liveness-probe reply. A `Check` that answers anything else is
/// treated as a dead peer.
pub const ACKNOWLEDGED: &str = "Acknowledged";
