//! Error taxonomy shared across the crate.
//!
//! # Categories
//! - `ProtocolError`: malformed HTTP/WebSocket input, fatal for the connection
//! - `TransportError`: bind/connect/send failures on the backend transport
//! - `MessageError`: multipart messages that do not match the wire layout
//! - `AuthError`: unreadable or missing peer-authentication material
//!
//! Startup failures (bind, missing certificates) abort the process; runtime
//! failures are logged by the owning loop, which then continues.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Malformed HTTP or WebSocket input.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The request line is not terminated by a line break.
    #[error("request line is not terminated")]
    TruncatedRequest,

    /// The request line does not contain exactly three tokens.
    #[error("request line does not contain exactly three tokens")]
    BadRequestLine,

    /// RFC6455 requires every client frame to be masked.
    #[error("client frame is not masked")]
    UnmaskedFrame,

    /// Fragmented frames are not supported.
    #[error("fragmented websocket frames are not supported")]
    FragmentedFrame,

    /// Reserved or unknown opcode bits.
    #[error("unknown websocket opcode {0:#x}")]
    UnknownOpcode(u8),
}

/// Failures on the identity-routed backend transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {endpoint}: {source}")]
    Bind { endpoint: String, source: io::Error },

    #[error("failed to connect to {endpoint}: {source}")]
    Connect { endpoint: String, source: io::Error },

    /// Endpoints must look like `tcp://host:port`.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// No connected peer matches the requested identity frame.
    #[error("no connected peer for the requested identity")]
    Unroutable,

    /// The peer's send queue is full or its writer has gone away.
    #[error("peer send queue is full or closed")]
    Congested,

    /// The remote side refused the authentication handshake.
    #[error("peer rejected the authentication handshake")]
    Rejected,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Multipart messages that do not match the command-message layout.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("unexpected frame count {0}")]
    BadFrameCount(usize),

    #[error("command frame is not valid utf-8")]
    BadCommand,

    #[error("correlation id frame is not 4 bytes")]
    BadCorrelation,

    #[error("data frame is shorter than the status prefix")]
    ShortData,

    /// A reply cannot be routed once its identity queue is drained.
    #[error("message route is empty")]
    EmptyRoute,
}

/// Peer-authentication material that cannot be loaded.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to read certificate material at {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("no certificate found at {path}")]
    Missing { path: PathBuf },
}
