//! Web-facing correlation gateway.
//!
//! # Data Flow
//! ```text
//! browser ──▶ http codec ──▶ server.rs (connection task)
//!                               │ notify_query_work: mint sequence,
//!                               │ record correlation, send to backend
//!                               ▼
//!                        backend transport
//!                               │ reply [sequence, status, payload]
//!                               ▼
//!          server.rs (reply task) ── correlation map ──▶ connection task
//!                                                        writes JSON-RPC
//! ```
//!
//! # Responsibilities
//! - Own every accepted HTTP/WebSocket connection
//! - Map (connection, client id) pairs onto internally minted sequence
//!   numbers and back
//! - Convert backend replies into JSON-RPC responses on the right socket

pub mod connection;
pub mod correlation;
pub mod json;
pub mod methods;
pub mod server;

use std::io;

use thiserror::Error;

use crate::error::TransportError;
use crate::http::Status;

pub use connection::{ConnectionHandle, ConnectionId, ConnectionState};
pub use correlation::{CorrelationEntry, Correlator, QueryWork, QueryWorkMap};
pub use methods::{MethodRegistry, QueryTranslator};
pub use server::WebGateway;

/// JSON-RPC error code: no handlers registered / invalid request.
pub const INVALID_REQUEST: i64 = -32600;
/// JSON-RPC error code: unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC error code: duplicate id, send failure or malformed reply.
pub const INTERNAL_ERROR: i64 = -32603;

/// Startup failures of the web gateway. Fatal; the caller aborts.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to bind web listener on {address}: {source}")]
    Bind { address: String, source: io::Error },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A rejected query: JSON-RPC error plus the status line it rides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryError {
    pub status: Status,
    pub code: i64,
    pub message: &'static str,
}

impl QueryError {
    /// No command handlers are registered at all.
    pub fn invalid_request() -> Self {
        Self {
            status: Status::ServiceUnavailable,
            code: INVALID_REQUEST,
            message: "Invalid Request.",
        }
    }

    /// The method has no registered handler.
    pub fn method_not_found() -> Self {
        Self {
            status: Status::NotFound,
            code: METHOD_NOT_FOUND,
            message: "Method not found.",
        }
    }

    /// Duplicate client id or backend send failure.
    pub fn internal_error() -> Self {
        Self {
            status: Status::InternalServerError,
            code: INTERNAL_ERROR,
            message: "Internal error.",
        }
    }
}
