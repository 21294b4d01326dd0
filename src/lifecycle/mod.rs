//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger the shutdown flag
//!
//! Shutdown (shutdown.rs):
//!     flag raised → loops observe it at the top of their next iteration
//!     → stop accepting, drain, exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
