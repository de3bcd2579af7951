use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use vaultdrive_protocol::OpKind;
use vaultdrive_protocol::envelope::{EventFrame, EventKind, RequestFrame, WorkerError};

use crate::transport::FramePipe;
use crate::{BridgeError, pump};

/// Callback type for unsolicited worker events.
pub type EventCallback = Box<dyn Fn(EventKind, EventFrame) + Send + Sync>;

/// Result routed to a pending caller by the read pump.
pub(crate) type PendingReply = Result<Box<serde_json::value::RawValue>, WorkerError>;

/// The engine-side endpoint of the worker boundary.
///
/// One instance serves all concurrent transfers: every call allocates the
/// next integer id, parks a continuation in the pending table, and the read
/// pump resolves it when the matching reply arrives. Calls placed before the
/// worker announces readiness wait rather than fail — the worker initializes
/// asynchronously and may not be accepting messages yet.
pub struct WorkerBridge {
    outbound: tokio::sync::mpsc::Sender<String>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<PendingReply>>>>,
    next_id: AtomicU64,
    ready_rx: watch::Receiver<bool>,
    on_event: Arc<Mutex<Option<EventCallback>>>,
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
    _pump_handle: tokio::task::JoinHandle<()>,
}

impl WorkerBridge {
    /// Attaches a bridge to the engine side of a worker transport and starts
    /// the read pump.
    pub fn connect(transport: FramePipe) -> Self {
        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<PendingReply>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let on_event: Arc<Mutex<Option<EventCallback>>> = Arc::new(Mutex::new(None));
        let (ready_tx, ready_rx) = watch::channel(false);
        let alive = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let pump_handle = {
            let pending = pending.clone();
            let on_event = on_event.clone();
            let alive = alive.clone();
            let cancel = cancel.clone();
            tokio::spawn(pump::read_pump(
                transport.rx,
                pending,
                on_event,
                ready_tx,
                alive,
                cancel,
            ))
        };

        Self {
            outbound: transport.tx,
            pending,
            next_id: AtomicU64::new(0),
            ready_rx,
            on_event,
            alive,
            cancel,
            _pump_handle: pump_handle,
        }
    }

    /// Sends a request and waits for the typed response.
    ///
    /// The timeout gates both readiness waiting and the response; on expiry
    /// the pending entry is evicted so a late reply becomes a no-op.
    pub async fn call<P, R>(
        &self,
        op: OpKind,
        payload: &P,
        timeout: Duration,
    ) -> Result<R, BridgeError>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let raw = self.call_raw(op, payload, timeout).await?;
        Ok(serde_json::from_str(raw.get())?)
    }

    /// Sends a request expecting no response body.
    pub async fn call_unit<P: serde::Serialize>(
        &self,
        op: OpKind,
        payload: &P,
        timeout: Duration,
    ) -> Result<(), BridgeError> {
        self.call_raw(op, payload, timeout).await?;
        Ok(())
    }

    async fn call_raw<P: serde::Serialize>(
        &self,
        op: OpKind,
        payload: &P,
        timeout: Duration,
    ) -> Result<Box<serde_json::value::RawValue>, BridgeError> {
        tokio::time::timeout(timeout, self.wait_ready())
            .await
            .map_err(|_| BridgeError::Timeout)??;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = RequestFrame::new(id, op, payload)?;
        let json = serde_json::to_string(&frame)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if self.outbound.send(json).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(BridgeError::Closed);
        }

        let result = tokio::time::timeout(timeout, rx).await;

        // Evict on every exit path; the pump removes the entry when routing
        // a reply, so this only matters for abandoned calls.
        self.pending.lock().await.remove(&id);

        match result {
            Ok(Ok(Ok(raw))) => Ok(raw),
            Ok(Ok(Err(err))) => Err(BridgeError::Worker(err)),
            // Sender dropped without a reply — the pump exited.
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => Err(BridgeError::Timeout),
        }
    }

    /// Waits until the worker has announced readiness.
    async fn wait_ready(&self) -> Result<(), BridgeError> {
        if !self.alive.load(Ordering::Relaxed) {
            return Err(BridgeError::Closed);
        }
        let mut ready = self.ready_rx.clone();
        ready
            .wait_for(|r| *r)
            .await
            .map_err(|_| BridgeError::Closed)?;
        Ok(())
    }

    /// Registers the callback for unsolicited worker events.
    pub async fn set_event_callback(&self, cb: EventCallback) {
        *self.on_event.lock().await = Some(cb);
    }

    /// Returns `true` while the read pump is attached to a live worker.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Returns `true` once the worker's ready frame has been observed.
    pub fn is_ready(&self) -> bool {
        *self.ready_rx.borrow()
    }

    /// Number of requests awaiting a reply.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Shuts the bridge down, failing any pending callers.
    pub async fn close(&self) {
        debug!("closing worker bridge");
        self.cancel.cancel();
        let mut pending = self.pending.lock().await;
        pending.clear();
    }
}

impl Drop for WorkerBridge {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._pump_handle.abort();
    }
}
