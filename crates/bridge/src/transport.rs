//! Frame transport between the engine and the worker.
//!
//! Both sides exchange serialized JSON text frames over a duplex pair of
//! bounded channels. Everything is encoded/decoded at the boundary — no
//! shared memory — so a real OS process transport (pipe, socket) can replace
//! the in-process pair without touching either side.

use tokio::sync::mpsc;

/// Channel capacity for each direction of the pair.
const PIPE_CAPACITY: usize = 256;

/// One side of the duplex frame channel.
pub struct FramePipe {
    /// Frames going to the peer.
    pub tx: mpsc::Sender<String>,
    /// Frames arriving from the peer.
    pub rx: mpsc::Receiver<String>,
}

/// Creates a connected (engine-side, worker-side) transport pair.
pub fn in_process_pair() -> (FramePipe, FramePipe) {
    let (to_worker_tx, to_worker_rx) = mpsc::channel(PIPE_CAPACITY);
    let (to_engine_tx, to_engine_rx) = mpsc::channel(PIPE_CAPACITY);

    let engine_side = FramePipe {
        tx: to_worker_tx,
        rx: to_engine_rx,
    };
    let worker_side = FramePipe {
        tx: to_engine_tx,
        rx: to_worker_rx,
    };
    (engine_side, worker_side)
}
