//! Cooperative shutdown flag.
//!
//! Cancellation is cooperative only: each loop checks the flag at the top
//! of an iteration, so it reacts within one poll interval. Backed by a
//! watch channel so tasks can also await the transition.

use tokio::sync::watch;

/// Owner side of the shutdown flag.
#[derive(Debug, Clone)]
pub struct Shutdown {
    flag: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self { flag }
    }

    /// Hand out an observer for a long-running loop.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            flag: self.flag.subscribe(),
        }
    }

    /// Raise the flag. Idempotent.
    pub fn trigger(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.flag.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side, cloneable per task.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    flag: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Non-blocking check, intended for the top of a loop iteration.
    pub fn is_triggered(&self) -> bool {
        *self.flag.borrow()
    }

    /// Wait until the flag is raised. Returns immediately if it already is;
    /// a dropped owner counts as shutdown.
    pub async fn triggered(&mut self) {
        // An error means the owner is gone, which also counts as shutdown.
        let _ = self.flag.wait_for(|raised| *raised).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flag_starts_low_and_latches_high() {
        let shutdown = Shutdown::new();
        let signal = shutdown.subscribe();
        assert!(!signal.is_triggered());

        shutdown.trigger();
        assert!(signal.is_triggered());
        assert!(shutdown.is_triggered());

        // Late subscribers see the latched flag.
        assert!(shutdown.subscribe().is_triggered());
    }

    #[tokio::test]
    async fn triggered_wakes_waiters() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();

        let waiter = tokio::spawn(async move {
            signal.triggered().await;
        });

        shutdown.trigger();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_owner_counts_as_shutdown() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        drop(shutdown);
        signal.triggered().await;
    }
}
