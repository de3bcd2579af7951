//! Download driver: windowed download-and-decrypt, then assembly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use vaultdrive_bridge::WorkerBridge;
use vaultdrive_protocol::OpKind;
use vaultdrive_protocol::constants::CHUNK_REQUEST_TIMEOUT;
use vaultdrive_protocol::messages::{ChunkDownloadResponse, DownloadAndDecryptChunkRequest};
use vaultdrive_protocol::types::FileDescriptor;

use crate::window::{WindowOutcome, drive_window};
use crate::{ChunkSettings, RetryPolicy, TransferControl, TransferError, TransferOutcome, retry};

/// Everything the download driver needs for one file.
#[derive(Debug, Clone)]
pub struct DownloadSpec {
    pub file: FileDescriptor,
    /// Final local path of the assembled plaintext file.
    pub destination: String,
    /// Per-transfer scratch directory for decrypted chunk files.
    pub temp_dir: String,
}

/// Moves one file from the remote store to local disk.
///
/// Each chunk is fetched and decrypted by the worker into
/// `<temp_dir>/<index>`; chunks complete in any order. Only once every index
/// is present are they assembled, in index order, into the destination file.
/// Temp artifacts are removed on every exit path.
pub async fn run_download(
    bridge: Arc<WorkerBridge>,
    spec: DownloadSpec,
    settings: ChunkSettings,
    policy: RetryPolicy,
    control: TransferControl,
    chunk_tx: mpsc::Sender<u64>,
) -> Result<TransferOutcome, TransferError> {
    if control.is_stopped() {
        return Ok(TransferOutcome::Stopped);
    }

    let temp_dir = PathBuf::from(&spec.temp_dir);
    let total = spec.file.chunks;

    // Zero-byte file: nothing to fetch, just materialize the destination.
    if total == 0 {
        create_parent_dirs(&spec.destination).await?;
        tokio::fs::File::create(&spec.destination).await?;
        info!(uuid = %spec.file.uuid, "zero-byte download complete");
        return Ok(TransferOutcome::Completed);
    }

    tokio::fs::create_dir_all(&temp_dir).await?;
    debug!(uuid = %spec.file.uuid, total, "starting chunk download");

    let outcome = {
        let bridge = bridge.clone();
        let file = spec.file.clone();
        let temp_dir = temp_dir.clone();
        drive_window(total, settings.window, &control, &chunk_tx, move |index| {
            let req = DownloadAndDecryptChunkRequest {
                uuid: file.uuid.clone(),
                region: file.region.clone(),
                bucket: file.bucket.clone(),
                index,
                key: file.key.clone(),
                destination: temp_dir.join(index.to_string()).to_string_lossy().into_owned(),
            };
            let bridge = bridge.clone();
            async move {
                let resp: ChunkDownloadResponse = retry(&policy, || {
                    bridge.call(OpKind::DownloadAndDecryptChunk, &req, CHUNK_REQUEST_TIMEOUT)
                })
                .await?;
                Ok(resp.index)
            }
        })
        .await
    };

    match outcome {
        Ok(WindowOutcome::Completed) if !control.is_stopped() => {}
        Ok(_) => {
            cleanup_temp(&temp_dir).await;
            return Ok(TransferOutcome::Stopped);
        }
        Err(e) => {
            cleanup_temp(&temp_dir).await;
            return Err(e);
        }
    }

    if let Err(e) = assemble(&temp_dir, total, &spec.destination).await {
        cleanup_temp(&temp_dir).await;
        return Err(e.into());
    }
    cleanup_temp(&temp_dir).await;

    info!(uuid = %spec.file.uuid, chunks = total, destination = %spec.destination, "download complete");
    Ok(TransferOutcome::Completed)
}

/// Concatenates decrypted chunk files in index order into the destination.
async fn assemble(temp_dir: &Path, total: u64, destination: &str) -> std::io::Result<()> {
    create_parent_dirs(destination).await?;
    let mut out = tokio::fs::File::create(destination).await?;
    for index in 0..total {
        let chunk_path = temp_dir.join(index.to_string());
        let mut chunk = tokio::fs::File::open(&chunk_path).await?;
        tokio::io::copy(&mut chunk, &mut out).await?;
    }
    out.sync_all().await?;
    Ok(())
}

async fn create_parent_dirs(destination: &str) -> std::io::Result<()> {
    if let Some(parent) = Path::new(destination).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

async fn cleanup_temp(temp_dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(temp_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %temp_dir.display(), "failed to remove temp chunks: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vaultdrive_bridge::transport::in_process_pair;
    use vaultdrive_worker::{ChunkStore, MemoryStore, Worker, crypto};

    fn test_settings() -> ChunkSettings {
        ChunkSettings {
            chunk_size: 8,
            window: 2,
        }
    }

    fn spawn_worker() -> (Arc<WorkerBridge>, Arc<MemoryStore>) {
        let (engine_side, worker_side) = in_process_pair();
        let store = Arc::new(MemoryStore::new());
        Worker::new(store.clone()).spawn(worker_side);
        (Arc::new(WorkerBridge::connect(engine_side)), store)
    }

    /// Seeds the store with encrypted chunks of `plaintext` and returns the
    /// matching descriptor.
    async fn seed_remote_file(
        store: &Arc<MemoryStore>,
        uuid: &str,
        plaintext: &[u8],
        chunk_size: u64,
    ) -> FileDescriptor {
        let key = crypto::generate_key();
        let chunks = crate::chunk::chunk_count(plaintext.len() as u64, chunk_size);
        for index in 0..chunks {
            let start = (index * chunk_size) as usize;
            let end = (start + chunk_size as usize).min(plaintext.len());
            let sealed = crypto::encrypt_chunk(&key, &plaintext[start..end]).unwrap();
            store.put_chunk(uuid, index, sealed).await.unwrap();
        }
        FileDescriptor {
            uuid: uuid.into(),
            name: "restored.bin".into(),
            size: plaintext.len() as u64,
            chunks,
            region: "eu-central".into(),
            bucket: "bucket-1".into(),
            key: hex::encode(key),
            version: 2,
        }
    }

    #[tokio::test]
    async fn downloads_and_assembles_in_index_order() {
        let (bridge, store) = spawn_worker();
        let settings = test_settings();
        let plaintext = b"The quick brown fox jumps over the lazy dog".to_vec();
        let file = seed_remote_file(&store, "f-dl", &plaintext, settings.chunk_size).await;

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out").join("restored.bin");
        let temp_dir = dir.path().join("tmp");

        let spec = DownloadSpec {
            file,
            destination: destination.to_string_lossy().into_owned(),
            temp_dir: temp_dir.to_string_lossy().into_owned(),
        };
        let (_handle, control) = crate::TransferControlHandle::new();
        let (chunk_tx, _chunk_rx) = mpsc::channel(64);

        let outcome = run_download(
            bridge,
            spec,
            settings,
            RetryPolicy::default(),
            control,
            chunk_tx,
        )
        .await
        .unwrap();
        assert_eq!(outcome, TransferOutcome::Completed);

        assert_eq!(std::fs::read(&destination).unwrap(), plaintext);
        assert!(!temp_dir.exists(), "temp chunks must be removed");
    }

    #[tokio::test]
    async fn zero_byte_download_creates_empty_file() {
        let (bridge, store) = spawn_worker();
        let settings = test_settings();
        let file = seed_remote_file(&store, "f-empty", b"", settings.chunk_size).await;
        assert_eq!(file.chunks, 0);

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("empty.bin");

        let spec = DownloadSpec {
            file,
            destination: destination.to_string_lossy().into_owned(),
            temp_dir: dir.path().join("tmp").to_string_lossy().into_owned(),
        };
        let (_handle, control) = crate::TransferControlHandle::new();
        let (chunk_tx, _chunk_rx) = mpsc::channel(4);

        let outcome = run_download(
            bridge,
            spec,
            settings,
            RetryPolicy::default(),
            control,
            chunk_tx,
        )
        .await
        .unwrap();
        assert_eq!(outcome, TransferOutcome::Completed);
        assert_eq!(std::fs::read(&destination).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn missing_chunk_fails_the_download() {
        let (bridge, store) = spawn_worker();
        let settings = test_settings();
        let mut file = seed_remote_file(&store, "f-gap", b"0123456789ABCDEF", settings.chunk_size).await;
        // Claim one more chunk than the remote holds.
        file.chunks += 1;
        file.size += 4;

        let dir = tempfile::tempdir().unwrap();
        let spec = DownloadSpec {
            file,
            destination: dir.path().join("out.bin").to_string_lossy().into_owned(),
            temp_dir: dir.path().join("tmp").to_string_lossy().into_owned(),
        };
        let (_handle, control) = crate::TransferControlHandle::new();
        let (chunk_tx, _chunk_rx) = mpsc::channel(64);

        let result = run_download(
            bridge,
            spec,
            settings,
            RetryPolicy::default(),
            control,
            chunk_tx,
        )
        .await;
        assert!(result.is_err());
        assert!(!dir.path().join("tmp").exists(), "temp cleaned up on failure");
        assert!(!dir.path().join("out.bin").exists());
    }

    #[tokio::test]
    async fn stop_cleans_up_and_reports_stopped() {
        let (bridge, store) = spawn_worker();
        let settings = test_settings();
        let file = seed_remote_file(&store, "f-stop", &[9u8; 64], settings.chunk_size).await;

        let dir = tempfile::tempdir().unwrap();
        let spec = DownloadSpec {
            file,
            destination: dir.path().join("out.bin").to_string_lossy().into_owned(),
            temp_dir: dir.path().join("tmp").to_string_lossy().into_owned(),
        };
        let (handle, control) = crate::TransferControlHandle::new();
        handle.stop();

        let (chunk_tx, _chunk_rx) = mpsc::channel(64);
        let outcome = run_download(
            bridge,
            spec,
            settings,
            RetryPolicy::default(),
            control,
            chunk_tx,
        )
        .await
        .unwrap();
        assert_eq!(outcome, TransferOutcome::Stopped);
        assert!(!dir.path().join("out.bin").exists());
    }
}
