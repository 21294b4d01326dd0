//! Wire-level message shapes for the backend transport.
//!
//! # Data Flow
//! ```text
//! multipart frames ──▶ route.rs   (identity envelope, FIFO)
//!                 ──▶ message.rs (command + correlation id + data)
//! ```

pub mod message;
pub mod route;

pub use message::{CommandRequest, OutgoingMessage, QueryReply};
pub use route::{Identity, Route};
