//! Error types for the RPC transport.

use crate::message::FaultKind;

/// Errors that can occur dialing, framing, or completing an RPC.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Could not open a TCP connection to the peer's RPC server.
    /// Recoverable; callers apply their bounded retry policy.
    #[error("unable to dial rpc server at {addr}: {source}")]
    UnableToDial {
        /// The address that refused us.
        addr: String,
        /// The underlying connect error.
        #[source]
        source: std::io::Error,
    },

    /// The peer accepted the connection but did not answer within the
    /// caller's deadline.
    #[error("peer at {addr} did not respond in time")]
    FailedToReach {
        /// The unresponsive peer.
        addr: String,
    },

    /// The connection died mid-frame.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// An inbound frame declared a length over [`MAX_FRAME_SIZE`].
    ///
    /// [`MAX_FRAME_SIZE`]: crate::MAX_FRAME_SIZE
    #[error("frame too large: {len} bytes")]
    OversizeFrame {
        /// The declared frame length.
        len: usize,
    },

    /// The peer answered with a variant the method did not expect.
    #[error("unexpected response variant for {method}")]
    UnexpectedResponse {
        /// The wire method that was called.
        method: &'static str,
    },

    /// The peer executed the request and reported a typed failure.
    #[error("fault from {addr}: {kind}: {message}")]
    Fault {
        /// The peer that reported the fault.
        addr: String,
        /// The fault tag.
        kind: FaultKind,
        /// Human-readable detail.
        message: String,
    },
}

impl NetError {
    /// The fault tag, when the error is a remote fault.
    pub fn fault_kind(&self) -> Option<FaultKind> {
        match self {
            NetError::Fault { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether this error means the peer could not be dialed at all.
    pub fn is_unable_to_dial(&self) -> bool {
        matches!(self, NetError::UnableToDial { .. })
    }
}
