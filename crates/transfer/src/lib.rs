//! Chunk transfer primitive.
//!
//! Moves exactly one file's bytes, chunk by chunk, through the worker
//! bridge: encrypt-then-upload on the way out, download-then-decrypt on the
//! way in. Chunks are dispatched with a bounded per-file window, each chunk
//! retries independently, and pause/stop signals are honored between
//! dispatches. The scheduler owns which transfers run; this crate owns how
//! a single file moves.

mod chunk;
mod control;
mod download;
mod retry;
mod upload;
mod window;

pub use chunk::{chunk_count, chunk_len, chunk_offset, file_sha256, hashed_name};
pub use control::{TransferControl, TransferControlHandle};
pub use download::{DownloadSpec, run_download};
pub use retry::{RetryPolicy, retry};
pub use upload::{UploadSpec, run_upload};

use vaultdrive_bridge::BridgeError;

/// Fixed-size chunking parameters for one transfer.
#[derive(Debug, Clone, Copy)]
pub struct ChunkSettings {
    /// Plaintext bytes per chunk.
    pub chunk_size: u64,
    /// Maximum in-flight chunk jobs for one file.
    pub window: usize,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            chunk_size: vaultdrive_protocol::constants::DEFAULT_CHUNK_SIZE,
            window: vaultdrive_protocol::constants::DEFAULT_CHUNK_WINDOW,
        }
    }
}

/// How a driver run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// All chunks moved and (for uploads) the file was finalized.
    Completed,
    /// Upload short-circuited: the file already exists at the destination.
    AlreadyExists { uuid: String },
    /// A stop was observed; no further chunk jobs were dispatched.
    Stopped,
}

/// Errors from transfer drivers.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A bridge call failed after the retry policy was exhausted (or
    /// permanently, without retry).
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("{0}")]
    Internal(String),
}
