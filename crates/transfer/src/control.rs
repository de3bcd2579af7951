//! Pause and stop signalling between the scheduler and a running driver.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Scheduler-held side of a transfer's control channel.
pub struct TransferControlHandle {
    paused_tx: watch::Sender<bool>,
    cancel: CancellationToken,
}

/// Driver-held side: consulted between chunk dispatches.
///
/// Pause gates *new* chunk jobs only — in-flight bridge calls run to
/// completion. Stop is cooperative: once observed, no further jobs are
/// dispatched and trailing results are discarded by the caller.
#[derive(Clone)]
pub struct TransferControl {
    paused_rx: watch::Receiver<bool>,
    cancel: CancellationToken,
}

impl TransferControlHandle {
    /// Creates a connected (handle, control) pair.
    pub fn new() -> (Self, TransferControl) {
        let (paused_tx, paused_rx) = watch::channel(false);
        let cancel = CancellationToken::new();
        let control = TransferControl {
            paused_rx,
            cancel: cancel.clone(),
        };
        (Self { paused_tx, cancel }, control)
    }

    pub fn pause(&self) {
        let _ = self.paused_tx.send(true);
    }

    pub fn resume(&self) {
        let _ = self.paused_tx.send(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused_tx.borrow()
    }

    /// Requests a cooperative stop.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl TransferControl {
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when a stop is requested.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Waits until the transfer is not paused.
    ///
    /// Returns immediately when running; if the handle is gone the gate
    /// opens (the stop token decides what happens next).
    pub async fn wait_unpaused(&self) {
        let mut rx = self.paused_rx.clone();
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn starts_running() {
        let (handle, control) = TransferControlHandle::new();
        assert!(!handle.is_paused());
        assert!(!control.is_stopped());
        // Gate must be open immediately.
        tokio::time::timeout(Duration::from_millis(100), control.wait_unpaused())
            .await
            .expect("gate should be open");
    }

    #[tokio::test]
    async fn pause_blocks_and_resume_opens() {
        let (handle, control) = TransferControlHandle::new();
        handle.pause();
        assert!(handle.is_paused());

        let gate = tokio::time::timeout(Duration::from_millis(50), control.wait_unpaused());
        assert!(gate.await.is_err(), "gate should be closed while paused");

        handle.resume();
        tokio::time::timeout(Duration::from_millis(100), control.wait_unpaused())
            .await
            .expect("gate should reopen after resume");
    }

    #[tokio::test]
    async fn pause_is_idempotent() {
        let (handle, control) = TransferControlHandle::new();
        handle.pause();
        handle.pause();
        handle.resume();
        tokio::time::timeout(Duration::from_millis(100), control.wait_unpaused())
            .await
            .expect("single resume undoes repeated pause");
    }

    #[tokio::test]
    async fn stop_is_observable_on_both_sides() {
        let (handle, control) = TransferControlHandle::new();
        handle.stop();
        assert!(handle.is_stopped());
        assert!(control.is_stopped());
        tokio::time::timeout(Duration::from_millis(100), control.cancelled())
            .await
            .expect("cancelled() should resolve");
    }
}
