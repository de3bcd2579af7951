//! Worker dispatch loop.

use std::sync::Arc;

use tracing::{debug, warn};

use vaultdrive_bridge::transport::FramePipe;
use vaultdrive_protocol::OpKind;
use vaultdrive_protocol::constants::MAX_FRAME_SIZE;
use vaultdrive_protocol::envelope::{EventFrame, ReplyFrame, RequestFrame};

use crate::handlers;
use crate::store::ChunkStore;

/// The isolated execution context performing crypto and chunk I/O.
///
/// Announces readiness, then serves request frames until the channel closes
/// or an `exit` request arrives. Each request runs in its own task so chunk
/// operations from concurrent transfers overlap freely; replies carry the
/// request's id and may be sent in any order.
pub struct Worker {
    store: Arc<dyn ChunkStore>,
}

impl Worker {
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self { store }
    }

    /// Starts the worker on the given transport.
    pub fn spawn(self, link: FramePipe) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(link))
    }

    async fn run(self, link: FramePipe) {
        let FramePipe { tx, mut rx } = link;

        // Initialization happens before this point in a real deployment
        // (key stores, network). Callers must not send until they see this.
        match serde_json::to_string(&EventFrame::ready()) {
            Ok(json) => {
                if tx.send(json).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!("failed to encode ready frame: {e}");
                return;
            }
        }
        debug!("worker ready");

        while let Some(text) = rx.recv().await {
            if text.len() > MAX_FRAME_SIZE {
                warn!("request frame too large ({} bytes), dropping", text.len());
                continue;
            }

            let frame: RequestFrame = match serde_json::from_str(&text) {
                Ok(f) => f,
                Err(e) => {
                    warn!("failed to parse request frame: {e}");
                    continue;
                }
            };

            if frame.op == OpKind::Shutdown {
                let reply = ReplyFrame::ok(frame.id, &serde_json::json!({}))
                    .unwrap_or_else(|_| ReplyFrame::error(frame.id, 500, "encode failure"));
                if let Ok(json) = serde_json::to_string(&reply) {
                    let _ = tx.send(json).await;
                }
                break;
            }

            let store = self.store.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let reply = handlers::dispatch(&store, &tx, frame).await;
                match serde_json::to_string(&reply) {
                    Ok(json) => {
                        let _ = tx.send(json).await;
                    }
                    Err(e) => warn!("failed to encode reply: {e}"),
                }
            });
        }

        debug!("worker loop exited");
    }
}
