//! Error types for node operations.

use rondo_net::{FaultKind, NetError};

/// Errors surfaced by node construction, lookup, and storage.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Could not bind the local RPC listener. Fatal to startup.
    #[error("rpc server unable to listen on {addr}: {source}")]
    UnableToListen {
        /// The address that failed to bind.
        addr: String,
        /// The underlying bind error.
        #[source]
        source: std::io::Error,
    },

    /// The join target already contains a node with this identifier.
    /// Fatal to this join attempt only.
    #[error("node with the same id already exists at {addr}")]
    NodeAlreadyExists {
        /// The address of the existing node.
        addr: String,
    },

    /// The predecessor slot is empty.
    #[error("no predecessor is known")]
    NilPredecessor,

    /// `GetValue` on a key this node does not hold.
    #[error("no key/value pair for {key:?}")]
    NoKeyValuePair {
        /// The missing key.
        key: String,
    },

    /// A transport-level failure (dial, timeout, codec, remote fault).
    #[error(transparent)]
    Net(#[from] NetError),
}

impl NodeError {
    /// The wire tag and message for this error, used when it crosses
    /// back to a caller as a fault response.
    pub(crate) fn as_fault(&self) -> (FaultKind, String) {
        let kind = match self {
            NodeError::NilPredecessor => FaultKind::NilPredecessor,
            NodeError::NoKeyValuePair { .. } => FaultKind::NoKeyValuePair,
            _ => FaultKind::Internal,
        };
        (kind, self.to_string())
    }
}
