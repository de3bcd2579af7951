//! Transfer queue, scheduler, and progress aggregation.
//!
//! The engine owns the transfer set exclusively: it admits queued transfers
//! under a global concurrency cap (FIFO by enqueue time), drives each active
//! one through the chunk transfer primitive, routes every failure into the
//! transfer's record instead of letting it escape, and publishes throttled
//! progress plus immediate terminal events to subscribers.

pub mod config;
mod events;
mod progress;
mod scheduler;

pub use config::EngineConfig;
pub use events::TransferEvent;
pub use scheduler::{CurrentTransfers, DownloadRequest, TransferEngine, UploadRequest};

/// Errors surfaced by engine entry points.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
