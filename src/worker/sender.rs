//! Reply relay into the dispatch loop.
//!
//! Any holder of a computed reply queues it here; the dispatch loop drains
//! the queue and performs the actual socket write, so no second task ever
//! touches the transport. Delivery is best effort: a full or closed queue
//! drops the message.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::messages::OutgoingMessage;

/// Cloneable handle onto the dispatch loop's wakeup queue.
#[derive(Clone)]
pub struct SendWorker {
    queue: mpsc::Sender<OutgoingMessage>,
}

impl SendWorker {
    pub(crate) fn new(queue: mpsc::Sender<OutgoingMessage>) -> Self {
        Self { queue }
    }

    /// Queue a reply for transmission. Failure is logged and the message
    /// dropped; there is no retry.
    pub fn queue_send(&self, message: OutgoingMessage) {
        match self.queue.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                tracing::warn!(
                    command = message.command(),
                    id = message.id(),
                    "Send queue full; dropping reply"
                );
            }
            Err(TrySendError::Closed(message)) => {
                tracing::warn!(
                    command = message.command(),
                    id = message.id(),
                    "Send queue closed; dropping reply"
                );
            }
        }
    }
}
