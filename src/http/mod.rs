//! Byte-level HTTP and WebSocket codec.
//!
//! # Data Flow
//! ```text
//! raw request bytes
//!     → request.rs   (parse_http → HttpRequest)
//!     → reply.rs     (status line + headers)
//!     → websocket.rs (RFC6455 framing, handshake key)
//! ```
//!
//! The gateway terminates raw sockets itself, so parsing and framing live
//! here rather than behind an HTTP library.

pub mod reply;
pub mod request;
pub mod websocket;

pub use reply::{HttpReply, Status};
pub use request::{parse_http, HttpRequest};
