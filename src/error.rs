//! Error types shared across the connection core.
//!
//! The taxonomy separates transport establishment failures ([`ConnectError`]),
//! per-frame protocol failures ([`ProtocolError`]), and the errors a request
//! caller can observe ([`RequestError`]). Errors local to one request never
//! escalate to the session; transport loss always cascades to every pending
//! request.

use std::io;

use thiserror::Error;

/// Failure to establish a transport.
///
/// Connect errors feed the session's retry sub-loop and are never surfaced to
/// request callers directly.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The underlying socket could not be opened.
    #[error("failed to open transport: {0}")]
    Io(#[from] io::Error),

    /// No candidate socket path accepted the connection.
    #[error("no reachable socket after {attempts} candidate paths")]
    NoSocket {
        /// Number of paths that were tried.
        attempts: usize,
    },
}

/// Per-frame protocol failures.
///
/// A protocol error invalidates only the frame that produced it. The session
/// logs the error and keeps reading.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame body was not valid JSON for the expected payload shape.
    #[error("malformed frame payload")]
    MalformedFrame(#[source] serde_json::Error),

    /// The frame carried an operation code outside the known table.
    #[error("unknown opcode {opcode}")]
    UnknownOpcode {
        /// Raw operation code from the wire.
        opcode: u32,
    },
}

/// A structured error reported by the peer in a response envelope.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("peer error {code}: {message}")]
pub struct RemoteError {
    /// Numeric error code assigned by the peer.
    pub code: u32,
    /// Human-readable description from the peer.
    pub message: String,
}

/// Errors a request caller can observe when awaiting a response.
///
/// Exactly one of these settles each pending request; a caller never sees a
/// panic or a session-level failure in any other form.
#[derive(Debug, Error)]
pub enum RequestError {
    /// No response arrived within the configured deadline.
    #[error("request timed out")]
    Timeout,

    /// The peer answered with an explicit error envelope.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The transport died while the request was in flight.
    #[error("connection lost before a response arrived")]
    ConnectionLost,

    /// The session is stopped; no transport will carry this request.
    #[error("session is not running")]
    Closed,

    /// The request payload could not be serialized.
    #[error("failed to encode request")]
    Encode(#[source] serde_json::Error),
}
