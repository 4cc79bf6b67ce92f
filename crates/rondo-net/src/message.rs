//! Wire protocol messages.
//!
//! One request and one response enum cover the whole peer surface.
//! Every message is postcard-serialized and sent as a single
//! length-prefixed frame.

use std::collections::HashMap;
use std::fmt;

use rondo_types::{KeyValue, NodeId};
use serde::{Deserialize, Serialize};

/// A request from one node to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Find the address of the node that succeeds `id` on the ring.
    Successor { id: NodeId },
    /// Return the callee's identifier.
    GetId,
    /// Return the callee's predecessor address, or a
    /// [`FaultKind::NilPredecessor`] fault if none is known.
    GetPredecessor,
    /// Advisory: the caller claims to be the callee's predecessor.
    Notify { addr: String },
    /// Liveness probe. Answered with the literal
    /// [`ACKNOWLEDGED`](crate::ACKNOWLEDGED) string.
    Check,
    /// Merge the given pairs into the callee's store.
    SetData { data: HashMap<String, Vec<u8>> },
    /// Look up a single key in the callee's local store.
    GetValue { key: String },
    /// Ask the callee to hand off to `to` every pair that belongs to
    /// `to`, deleting its own copies afterwards.
    TransferData { to: String },
    /// Point the callee's successor at `addr`. The callee's own
    /// address collapses the successor back to itself.
    SetSuccessor { addr: String },
    /// Point the callee's predecessor at `addr`. The callee's own
    /// address clears the predecessor instead.
    SetPredecessor { addr: String },
    /// Client-facing: route the pair to its owner and store it there.
    Save { kv: KeyValue },
    /// Client-facing: route to the owner of `key` and fetch the value.
    Retrieve { key: String },
}

/// A response to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// Answer to [`Request::Successor`].
    Successor { addr: String },
    /// Answer to [`Request::GetId`].
    Id { id: NodeId },
    /// Answer to [`Request::GetPredecessor`].
    Predecessor { addr: String },
    /// Answer to [`Request::Check`].
    Checked { reply: String },
    /// Answer to [`Request::GetValue`].
    Value { value: Vec<u8> },
    /// Answer to [`Request::Save`]: the address of the storing node.
    Saved { addr: String },
    /// Answer to [`Request::Retrieve`]. A miss carries the error
    /// string as the value rather than a fault.
    Retrieved { value: Vec<u8> },
    /// Answer to the remaining fire-and-forget style requests.
    Ack,
    /// The callee could not satisfy the request.
    Fault { kind: FaultKind, message: String },
}

/// Tag for errors that cross the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    /// The queried predecessor slot is empty. Informational; drives
    /// the unsolicited-notify branch of stabilization.
    NilPredecessor,
    /// `GetValue` on a key the callee does not hold.
    NoKeyValuePair,
    /// Anything else; the message carries the detail.
    Internal,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::NilPredecessor => write!(f, "nil predecessor"),
            FaultKind::NoKeyValuePair => write!(f, "no key/value pair"),
            FaultKind::Internal => write!(f, "internal fault"),
        }
    }
}
