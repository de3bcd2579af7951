//! Upload driver: existence check, windowed encrypt-and-upload, finalize.

use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::mpsc;
use tracing::{debug, info};

use vaultdrive_bridge::WorkerBridge;
use vaultdrive_protocol::OpKind;
use vaultdrive_protocol::constants::{CHUNK_REQUEST_TIMEOUT, WORKER_REQUEST_TIMEOUT};
use vaultdrive_protocol::messages::{
    ChunkUploadResponse, EncryptAndUploadChunkRequest, EncryptDataRequest, EncryptDataResponse,
    FileExistsRequest, FileExistsResponse, UploadDoneRequest, UploadDoneResponse,
};
use vaultdrive_protocol::types::FileDescriptor;

use crate::chunk::{chunk_len, chunk_offset, file_sha256};
use crate::window::{WindowOutcome, drive_window};
use crate::{ChunkSettings, RetryPolicy, TransferControl, TransferError, TransferOutcome, retry};

/// Everything the upload driver needs for one file.
#[derive(Debug, Clone)]
pub struct UploadSpec {
    pub file: FileDescriptor,
    pub local_path: String,
    /// Destination folder uuid.
    pub parent: String,
    /// Hashed name for the remote existence check.
    pub name_hashed: String,
    pub mime: String,
}

/// Moves one file to the remote store.
///
/// Pipeline: existence pre-check (dedupe) → whole-file digest → windowed
/// encrypt-and-upload per chunk → encrypted-name metadata → finalize. The
/// transfer is not complete until finalize succeeds; chunks alone are not a
/// visible file.
pub async fn run_upload(
    bridge: Arc<WorkerBridge>,
    spec: UploadSpec,
    settings: ChunkSettings,
    policy: RetryPolicy,
    control: TransferControl,
    chunk_tx: mpsc::Sender<u64>,
) -> Result<TransferOutcome, TransferError> {
    if control.is_stopped() {
        return Ok(TransferOutcome::Stopped);
    }

    // Dedupe: a file already present at (parent, name) short-circuits to
    // done without moving bytes.
    let exists_req = FileExistsRequest {
        parent: spec.parent.clone(),
        name_hashed: spec.name_hashed.clone(),
    };
    let exists: FileExistsResponse = retry(&policy, || {
        bridge.call(OpKind::FileExists, &exists_req, WORKER_REQUEST_TIMEOUT)
    })
    .await?;
    if exists.exists {
        let uuid = exists.uuid.unwrap_or_else(|| spec.file.uuid.clone());
        info!(name = %spec.file.name, %uuid, "file already exists remotely, skipping upload");
        return Ok(TransferOutcome::AlreadyExists { uuid });
    }

    // Whole-file digest, recorded at finalize.
    let sha256 = {
        let path = PathBuf::from(&spec.local_path);
        tokio::task::spawn_blocking(move || file_sha256(&path))
            .await
            .map_err(|e| TransferError::Internal(format!("hash task failed: {e}")))??
    };

    let total = spec.file.chunks;
    debug!(uuid = %spec.file.uuid, total, "starting chunk upload");

    let outcome = {
        let bridge = bridge.clone();
        let file = spec.file.clone();
        let local_path = spec.local_path.clone();
        let parent = spec.parent.clone();
        let chunk_size = settings.chunk_size;
        drive_window(total, settings.window, &control, &chunk_tx, move |index| {
            let req = EncryptAndUploadChunkRequest {
                uuid: file.uuid.clone(),
                index,
                offset: chunk_offset(chunk_size, index),
                length: chunk_len(file.size, chunk_size, index),
                local_path: local_path.clone(),
                key: file.key.clone(),
                bucket: file.bucket.clone(),
                region: file.region.clone(),
                parent: parent.clone(),
            };
            let bridge = bridge.clone();
            async move {
                let resp: ChunkUploadResponse = retry(&policy, || {
                    bridge.call(OpKind::EncryptAndUploadChunk, &req, CHUNK_REQUEST_TIMEOUT)
                })
                .await?;
                Ok(resp.index)
            }
        })
        .await?
    };
    if outcome == WindowOutcome::Stopped || control.is_stopped() {
        return Ok(TransferOutcome::Stopped);
    }

    // The remote only ever stores the name encrypted under the file key.
    let name_req = EncryptDataRequest {
        key: spec.file.key.clone(),
        data: BASE64.encode(spec.file.name.as_bytes()),
    };
    let name_encrypted: EncryptDataResponse = retry(&policy, || {
        bridge.call(OpKind::EncryptData, &name_req, WORKER_REQUEST_TIMEOUT)
    })
    .await?;

    let done_req = UploadDoneRequest {
        uuid: spec.file.uuid.clone(),
        name_encrypted: name_encrypted.data,
        name_hashed: spec.name_hashed.clone(),
        size: spec.file.size,
        chunks: total,
        sha256,
        key: spec.file.key.clone(),
        parent: spec.parent.clone(),
        region: spec.file.region.clone(),
        bucket: spec.file.bucket.clone(),
        mime: spec.mime.clone(),
    };
    let done: UploadDoneResponse = retry(&policy, || {
        bridge.call(OpKind::UploadDone, &done_req, WORKER_REQUEST_TIMEOUT)
    })
    .await?;

    info!(uuid = %done.uuid, chunks = total, "upload finalized");
    Ok(TransferOutcome::Completed)
}
