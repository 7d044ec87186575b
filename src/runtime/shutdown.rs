//! Cooperative shutdown latch.
//!
//! A [`ShutdownSignal`] is cloned into every component that sleeps or admits
//! new work. Once triggered it stays triggered.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

/// Cloneable one-way shutdown flag with async waiting.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// Create an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trigger shutdown. Idempotent.
    pub fn trigger(&self) {
        let changed = self.tx.send_if_modified(|flag| {
            let was = *flag;
            *flag = true;
            !was
        });
        if changed {
            info!("shutdown requested");
        }
    }

    /// True once [`Self::trigger`] has been called.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve when shutdown is triggered.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns once triggered.
        let _ = rx.wait_for(|flag| *flag).await;
    }

    /// Sleep for `duration` in steps of at most `step`, returning early on shutdown.
    ///
    /// Returns `true` when the full duration elapsed and `false` when
    /// interrupted.
    pub async fn sleep(&self, duration: Duration, step: Duration) -> bool {
        let step = if step.is_zero() { duration } else { step };
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.is_triggered() {
                return false;
            }
            let chunk = remaining.min(step);
            tokio::select! {
                () = tokio::time::sleep(chunk) => {}
                () = self.wait() => return false,
            }
            remaining = remaining.saturating_sub(chunk);
        }
        !self.is_triggered()
    }
}
