use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Chunk size used to slice files for encryption and transfer (1 MiB).
///
/// Every chunk except the last spans exactly this many plaintext bytes.
/// The remote object store addresses chunks by `(file uuid, chunk index)`.
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Timeout for control operations (key derivation, hashing, metadata calls).
pub const WORKER_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for chunk operations.
///
/// Chunk requests cover disk I/O, AEAD work, and a network round-trip on the
/// worker side and may take far longer than control traffic.
pub const CHUNK_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Maximum serialized frame size accepted on either side of the bridge (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Maximum attempts for a network-dependent step before it fails permanently.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Fixed delay between retry attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Minimum interval between UI-facing progress emissions per transfer.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Global cap on simultaneously active transfers.
pub const DEFAULT_MAX_CONCURRENT_TRANSFERS: usize = 3;

/// Per-file bound on in-flight chunk jobs.
pub const DEFAULT_CHUNK_WINDOW: usize = 4;

/// Worker operation identifier.
///
/// A closed set: every message crossing the worker boundary names one of
/// these. Unknown values deserialize to [`OpKind::Unknown`] so a newer worker
/// cannot crash an older engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    // Crypto primitives
    #[serde(rename = "encryptData")]
    EncryptData,
    #[serde(rename = "decryptData")]
    DecryptData,
    #[serde(rename = "hashFn")]
    HashData,
    #[serde(rename = "deriveKeyFromPassword")]
    DeriveKeyFromPassword,
    #[serde(rename = "generateKeypair")]
    GenerateKeypair,

    // Chunk I/O
    #[serde(rename = "encryptAndUploadChunk")]
    EncryptAndUploadChunk,
    #[serde(rename = "downloadAndDecryptChunk")]
    DownloadAndDecryptChunk,

    // Remote metadata API
    #[serde(rename = "fileExists")]
    FileExists,
    #[serde(rename = "uploadDone")]
    UploadDone,

    // Lifecycle
    #[serde(rename = "exit")]
    Shutdown,

    /// Forward compatibility: unknown operation names deserialize here.
    #[serde(other)]
    Unknown,
}

/// Worker error codes (HTTP-status-shaped).
pub const ERR_CODE_BAD_REQUEST: i32 = 400;
pub const ERR_CODE_INVALID_KEY: i32 = 401;
pub const ERR_CODE_NOT_FOUND: i32 = 404;
pub const ERR_CODE_CONFLICT: i32 = 409;
pub const ERR_CODE_INTERNAL: i32 = 500;
pub const ERR_CODE_UNAVAILABLE: i32 = 503;
pub const ERR_CODE_TIMEOUT: i32 = 504;
pub const ERR_CODE_INSUFFICIENT_STORAGE: i32 = 507;
