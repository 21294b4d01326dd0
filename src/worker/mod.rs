//! Backend dispatch loop and its send relay.
//!
//! # Data Flow
//! ```text
//! routed socket ──▶ dispatch.rs (poll → handler by command name)
//!                        │
//!     handler reply ──▶ sender.rs (wakeup queue) ──▶ dispatch.rs ──▶ socket
//! ```
//!
//! The dispatch loop is the only code that touches the transport sockets;
//! every reply funnels through the wakeup queue so the write always happens
//! on the loop that owns them.

pub mod dispatch;
pub mod sender;

use thiserror::Error;

use crate::error::{AuthError, TransportError};

pub use dispatch::{CommandHandler, RequestWorker};
pub use sender::SendWorker;

/// Startup failures of the dispatch loop. Fatal; the caller aborts.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}
