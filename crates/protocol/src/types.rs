use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    #[serde(rename = "upload")]
    Upload,
    #[serde(rename = "download")]
    Download,
}

/// Lifecycle state of a transfer.
///
/// Legal transitions: `Queued -> Active`, `Active <-> Paused`,
/// `{Queued, Active, Paused} -> Stopped`, `Active -> {Done, Failed}`,
/// `Paused -> {Done, Failed}` (an in-flight chunk may still finish or fail
/// the transfer while paused). Terminal states (`Done`, `Failed`, `Stopped`)
/// are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferState {
    #[serde(rename = "queued")]
    Queued,
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "paused")]
    Paused,
    #[serde(rename = "stopped")]
    Stopped,
    #[serde(rename = "done")]
    Done,
    #[serde(rename = "failed")]
    Failed,
}

impl TransferState {
    /// Returns `true` for states that cannot be left.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Done | Self::Failed)
    }

    /// Returns `true` if the transfer still occupies (or may claim) work.
    pub fn is_ongoing(self) -> bool {
        matches!(self, Self::Queued | Self::Active | Self::Paused)
    }

    /// Whether moving to `next` is a legal state-machine step.
    pub fn can_transition(self, next: Self) -> bool {
        use TransferState::*;
        match (self, next) {
            (Queued, Active) | (Queued, Stopped) => true,
            (Active, Paused) | (Active, Stopped) | (Active, Done) | (Active, Failed) => true,
            (Paused, Active) | (Paused, Stopped) | (Paused, Done) | (Paused, Failed) => true,
            _ => false,
        }
    }
}

/// Everything needed to address and decrypt one remote file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    /// Remote identifier of the file.
    pub uuid: String,
    pub name: String,
    /// Plaintext size in bytes.
    pub size: u64,
    /// Number of fixed-size chunks the file is split into.
    pub chunks: u64,
    pub region: String,
    pub bucket: String,
    /// Hex-encoded 32-byte file key.
    pub key: String,
    /// Encryption format version.
    pub version: u32,
}

/// One tracked transfer, as exposed to consumers.
///
/// Snapshots of this record are handed out freely; the authoritative copy is
/// owned exclusively by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub id: Uuid,
    pub kind: TransferKind,
    pub file: FileDescriptor,
    pub local_path: String,
    /// Destination folder uuid (uploads) or local destination path context
    /// (downloads keep it for display).
    pub remote_parent: String,
    pub state: TransferState,
    pub chunks_done: u64,
    pub total_chunks: u64,
    pub queued_at: chrono::DateTime<chrono::Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Transfer {
    /// Completion percentage in `[0, 100]`. A zero-chunk transfer is 100%.
    pub fn percent(&self) -> f64 {
        if self.total_chunks == 0 {
            return 100.0;
        }
        ((self.chunks_done as f64 / self.total_chunks as f64) * 100.0).clamp(0.0, 100.0)
    }

    /// Plaintext bytes moved so far, derived from completed chunks.
    pub fn bytes_done(&self, chunk_size: u64) -> u64 {
        (self.chunks_done * chunk_size).min(self.file.size)
    }
}

/// Aggregated, UI-facing view over all tracked transfers.
///
/// Recomputed from the live transfer set; never authoritative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    /// Per-transfer completion percentage for ongoing transfers.
    pub active: HashMap<Uuid, f64>,
    pub active_count: usize,
    pub finished_count: usize,
    /// Byte-weighted aggregate percentage across ongoing transfers.
    pub progress: f64,
    /// Estimated throughput in bytes per second.
    pub speed: f64,
    /// Estimated seconds until the ongoing set drains (0 when idle).
    pub remaining: u64,
}
