//! Bridge to the isolated crypto/IO worker.
//!
//! The engine's main loop never encrypts, decrypts, hashes, or touches raw
//! chunk bytes — it sends typed requests over a serialized message channel
//! and awaits typed responses correlated by a monotonically increasing
//! request id. This crate owns that boundary: the pending-request table, the
//! read pump dispatching replies and unsolicited events, queue-until-ready
//! gating, and per-call timeouts.

mod bridge;
mod pump;
pub mod transport;

pub use bridge::{EventCallback, WorkerBridge};
pub use transport::{FramePipe, in_process_pair};

use vaultdrive_protocol::envelope::WorkerError;

/// Errors from bridge calls.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No response arrived within the call's timeout.
    #[error("worker request timed out")]
    Timeout,

    /// The worker is gone; the request cannot be delivered or was abandoned.
    #[error("worker connection closed")]
    Closed,

    /// The worker answered with an error reply.
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// The worker replied success but without a response body.
    #[error("empty worker response")]
    EmptyResponse,
}

impl BridgeError {
    /// Returns `true` if retrying the call may succeed.
    ///
    /// Timeouts and an unresponsive worker are transient per the retry
    /// policy; worker errors carry their own classification.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Closed => true,
            Self::Worker(err) => err.is_transient(),
            Self::Json(_) | Self::EmptyResponse => false,
        }
    }
}
