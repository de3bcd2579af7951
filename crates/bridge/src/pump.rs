//! Bridge read pump — dispatches frames arriving from the worker.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use vaultdrive_protocol::constants::MAX_FRAME_SIZE;
use vaultdrive_protocol::envelope::{EventKind, InboundFrame};

use crate::bridge::{EventCallback, PendingReply};

/// Reads frames from the worker and dispatches them.
///
/// Replies are routed to the pending continuation matching their id; an id
/// with no pending continuation is a no-op (the caller already timed out or
/// the transfer was stopped). The `ready` event flips the readiness flag.
/// When the inbound channel closes the worker is gone: every pending caller
/// is failed rather than left hanging.
pub(crate) async fn read_pump(
    mut inbound: mpsc::Receiver<String>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<PendingReply>>>>,
    on_event: Arc<Mutex<Option<EventCallback>>>,
    ready_tx: watch::Sender<bool>,
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            frame = inbound.recv() => {
                match frame {
                    Some(text) => handle_frame(&text, &pending, &on_event, &ready_tx).await,
                    None => {
                        debug!("worker channel closed");
                        break;
                    }
                }
            }
        }
    }

    alive.store(false, Ordering::Relaxed);

    // Fail every pending caller: dropping the senders wakes the receivers
    // with a closed-channel error.
    let mut map = pending.lock().await;
    if !map.is_empty() {
        warn!(count = map.len(), "worker gone with requests in flight");
    }
    map.clear();
}

/// Handles a single frame from the worker.
async fn handle_frame(
    text: &str,
    pending: &Arc<Mutex<HashMap<u64, oneshot::Sender<PendingReply>>>>,
    on_event: &Arc<Mutex<Option<EventCallback>>>,
    ready_tx: &watch::Sender<bool>,
) {
    if text.len() > MAX_FRAME_SIZE {
        warn!("frame too large ({} bytes), dropping", text.len());
        return;
    }

    let frame = match InboundFrame::parse(text) {
        Ok(f) => f,
        Err(e) => {
            warn!("failed to parse worker frame: {e}");
            return;
        }
    };

    match frame {
        InboundFrame::Reply(reply) => {
            trace!(id = reply.id, has_err = reply.err.is_some(), "worker reply");

            let mut map = pending.lock().await;
            let Some(tx) = map.remove(&reply.id) else {
                // Already resolved or abandoned after stop/timeout.
                debug!(id = reply.id, "reply with no pending continuation");
                return;
            };
            drop(map);

            let result = match reply.err {
                Some(err) => Err(err),
                None => match reply.response {
                    Some(raw) => Ok(raw),
                    None => {
                        // Treat a bodyless success as an empty JSON object so
                        // unit calls resolve.
                        match serde_json::value::RawValue::from_string("{}".into()) {
                            Ok(raw) => Ok(raw),
                            Err(e) => {
                                warn!("failed to build empty response: {e}");
                                return;
                            }
                        }
                    }
                },
            };
            let _ = tx.send(result);
        }
        InboundFrame::Event(event) => {
            if event.kind == EventKind::Ready {
                debug!("worker ready");
                let _ = ready_tx.send(true);
                return;
            }

            let guard = on_event.lock().await;
            if let Some(cb) = guard.as_ref() {
                cb(event.kind, event);
            } else {
                trace!(kind = ?event.kind, "no event callback set — dropping worker event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultdrive_protocol::envelope::{EventFrame, ReplyFrame};

    fn test_state() -> (
        Arc<Mutex<HashMap<u64, oneshot::Sender<PendingReply>>>>,
        Arc<Mutex<Option<EventCallback>>>,
        watch::Sender<bool>,
        watch::Receiver<bool>,
    ) {
        let (ready_tx, ready_rx) = watch::channel(false);
        (
            Arc::new(Mutex::new(HashMap::new())),
            Arc::new(Mutex::new(None)),
            ready_tx,
            ready_rx,
        )
    }

    #[tokio::test]
    async fn reply_routes_to_pending() {
        let (pending, on_event, ready_tx, _ready_rx) = test_state();
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(3, tx);

        let reply = ReplyFrame::ok(3, &serde_json::json!({"x": 1})).unwrap();
        let json = serde_json::to_string(&reply).unwrap();
        handle_frame(&json, &pending, &on_event, &ready_tx).await;

        let raw = rx.await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(raw.get()).unwrap();
        assert_eq!(value["x"], 1);
        assert!(pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn error_reply_routes_as_err() {
        let (pending, on_event, ready_tx, _ready_rx) = test_state();
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(8, tx);

        let reply = ReplyFrame::error(8, 404, "not found");
        let json = serde_json::to_string(&reply).unwrap();
        handle_frame(&json, &pending, &on_event, &ready_tx).await;

        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.code, 404);
    }

    #[tokio::test]
    async fn unknown_id_is_noop() {
        let (pending, on_event, ready_tx, _ready_rx) = test_state();
        let reply = ReplyFrame::ok(99, &serde_json::json!({})).unwrap();
        let json = serde_json::to_string(&reply).unwrap();
        // Must not panic or disturb unrelated entries.
        let (tx, _rx) = oneshot::channel();
        pending.lock().await.insert(1, tx);
        handle_frame(&json, &pending, &on_event, &ready_tx).await;
        assert_eq!(pending.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn ready_event_flips_flag() {
        let (pending, on_event, ready_tx, ready_rx) = test_state();
        let json = serde_json::to_string(&EventFrame::ready()).unwrap();
        handle_frame(&json, &pending, &on_event, &ready_tx).await;
        assert!(*ready_rx.borrow());
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped() {
        let (pending, on_event, ready_tx, ready_rx) = test_state();
        handle_frame("not json {{{", &pending, &on_event, &ready_tx).await;
        assert!(!*ready_rx.borrow());
    }

    #[tokio::test]
    async fn oversized_frame_is_dropped() {
        let (pending, on_event, ready_tx, _ready_rx) = test_state();
        let huge = "x".repeat(MAX_FRAME_SIZE + 1);
        handle_frame(&huge, &pending, &on_event, &ready_tx).await;
    }

    #[tokio::test]
    async fn pump_exit_fails_pending() {
        let (pending, on_event, ready_tx, _ready_rx) = test_state();
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(1, tx);

        let (_in_tx, in_rx) = mpsc::channel::<String>(4);
        drop(_in_tx);
        let alive = Arc::new(AtomicBool::new(true));
        read_pump(
            in_rx,
            pending.clone(),
            on_event,
            ready_tx,
            alive.clone(),
            CancellationToken::new(),
        )
        .await;

        assert!(!alive.load(Ordering::Relaxed));
        assert!(rx.await.is_err(), "pending caller must be woken with error");
        assert!(pending.lock().await.is_empty());
    }
}
