//! Termination channel
//!
//! A one-shot latch the host waits on. Once signalled it stays signalled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct TerminationChannel {
    tx: Arc<watch::Sender<bool>>,
}

impl TerminationChannel {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the latch. Signalling twice is harmless.
    pub fn signal(&self) {
        if !self.tx.send_replace(true) {
            tracing::info!("Termination signalled");
        }
    }

    pub fn is_terminated(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the latch fires.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|terminated| *terminated).await;
    }

    /// Wait at most `timeout`; returns whether the latch fired.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tracing::debug!(timeout_ms = timeout.as_millis() as u64, "Waiting for termination");
        let fired = tokio::time::timeout(timeout, self.wait()).await.is_ok();
        if !fired {
            tracing::info!(timeout_ms = timeout.as_millis() as u64, "Wait for termination timed out");
        }
        fired
    }
}

impl Default for TerminationChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_times_out_before_signal() {
        let channel = TerminationChannel::new();
        assert!(!channel.is_terminated());
        assert!(!channel.wait_timeout(Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_signal_releases_waiters() {
        let channel = TerminationChannel::new();
        let waiter = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.wait_timeout(Duration::from_secs(5)).await })
        };

        channel.signal();
        channel.signal();
        assert!(waiter.await.unwrap());
        assert!(channel.is_terminated());
        assert!(channel.wait_timeout(Duration::from_millis(1)).await);
    }
}
