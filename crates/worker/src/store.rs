//! Object-store seam for chunk and metadata persistence.
//!
//! The worker addresses the remote through this trait only. [`MemoryStore`]
//! is the reference implementation used by tests and local runs; a real
//! deployment substitutes an HTTP client speaking to the storage provider.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use vaultdrive_protocol::constants::{
    ERR_CODE_BAD_REQUEST, ERR_CODE_CONFLICT, ERR_CODE_INSUFFICIENT_STORAGE, ERR_CODE_NOT_FOUND,
};
use vaultdrive_protocol::envelope::WorkerError;
use vaultdrive_protocol::messages::UploadDoneRequest;

/// A boxed future returned by store methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, WorkerError>> + Send + 'a>>;

/// Remote object store interface.
///
/// Chunks are addressed by `(file uuid, chunk index)`; metadata by file uuid
/// and by `(parent, hashed name)` for existence checks. All errors carry a
/// [`WorkerError`] code so callers can classify them.
pub trait ChunkStore: Send + Sync + 'static {
    /// Stores one ciphertext chunk.
    fn put_chunk(&self, uuid: &str, index: u64, data: Vec<u8>) -> StoreFuture<'_, ()>;

    /// Fetches one ciphertext chunk.
    fn get_chunk(&self, uuid: &str, index: u64) -> StoreFuture<'_, Vec<u8>>;

    /// Returns the uuid of the file at `(parent, name_hashed)`, if any.
    fn file_exists(&self, parent: &str, name_hashed: &str) -> StoreFuture<'_, Option<String>>;

    /// Registers file metadata, making the uploaded chunks a visible file.
    fn finalize(&self, meta: UploadDoneRequest) -> StoreFuture<'_, ()>;
}

#[derive(Default)]
struct MemoryInner {
    chunks: HashMap<(String, u64), Vec<u8>>,
    files: HashMap<String, UploadDoneRequest>,
    by_location: HashMap<(String, String), String>,
    used_bytes: u64,
}

/// In-memory [`ChunkStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    /// Byte capacity; exceeding it yields an insufficient-storage rejection.
    capacity: Mutex<Option<u64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the store at `bytes`; later puts beyond it are rejected with
    /// code 507.
    pub fn set_capacity(&self, bytes: u64) {
        *self.capacity.lock().unwrap() = Some(bytes);
    }

    /// Pre-registers a remote file so existence checks find it.
    pub fn seed_file(&self, meta: UploadDoneRequest) {
        let mut inner = self.inner.lock().unwrap();
        inner.by_location.insert(
            (meta.parent.clone(), meta.name_hashed.clone()),
            meta.uuid.clone(),
        );
        inner.files.insert(meta.uuid.clone(), meta);
    }

    /// Indices of chunks stored for `uuid`, unordered.
    pub fn chunk_indices(&self, uuid: &str) -> Vec<u64> {
        let inner = self.inner.lock().unwrap();
        inner
            .chunks
            .keys()
            .filter(|(u, _)| *u == uuid)
            .map(|(_, i)| *i)
            .collect()
    }

    /// Returns the registered metadata for `uuid`, if finalized.
    pub fn file_meta(&self, uuid: &str) -> Option<UploadDoneRequest> {
        self.inner.lock().unwrap().files.get(uuid).cloned()
    }

    /// Total number of stored chunks across all files.
    pub fn total_chunks(&self) -> usize {
        self.inner.lock().unwrap().chunks.len()
    }
}

impl ChunkStore for MemoryStore {
    fn put_chunk(&self, uuid: &str, index: u64, data: Vec<u8>) -> StoreFuture<'_, ()> {
        let uuid = uuid.to_string();
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            if let Some(cap) = *self.capacity.lock().unwrap() {
                if inner.used_bytes + data.len() as u64 > cap {
                    return Err(WorkerError::new(
                        ERR_CODE_INSUFFICIENT_STORAGE,
                        "insufficient storage",
                    ));
                }
            }
            inner.used_bytes += data.len() as u64;
            inner.chunks.insert((uuid, index), data);
            Ok(())
        })
    }

    fn get_chunk(&self, uuid: &str, index: u64) -> StoreFuture<'_, Vec<u8>> {
        let key = (uuid.to_string(), index);
        Box::pin(async move {
            let inner = self.inner.lock().unwrap();
            inner.chunks.get(&key).cloned().ok_or_else(|| {
                WorkerError::new(ERR_CODE_NOT_FOUND, format!("chunk {}/{} not found", key.0, key.1))
            })
        })
    }

    fn file_exists(&self, parent: &str, name_hashed: &str) -> StoreFuture<'_, Option<String>> {
        let key = (parent.to_string(), name_hashed.to_string());
        Box::pin(async move {
            let inner = self.inner.lock().unwrap();
            Ok(inner.by_location.get(&key).cloned())
        })
    }

    fn finalize(&self, meta: UploadDoneRequest) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();

            if inner.files.contains_key(&meta.uuid) {
                return Err(WorkerError::new(
                    ERR_CODE_CONFLICT,
                    format!("file {} already registered", meta.uuid),
                ));
            }

            // All chunk indices must be present before the file becomes
            // visible; a gap means the upload lied about completeness.
            let present = inner
                .chunks
                .keys()
                .filter(|(u, _)| *u == meta.uuid)
                .count() as u64;
            if present != meta.chunks {
                return Err(WorkerError::new(
                    ERR_CODE_BAD_REQUEST,
                    format!("expected {} chunks, found {present}", meta.chunks),
                ));
            }

            inner.by_location.insert(
                (meta.parent.clone(), meta.name_hashed.clone()),
                meta.uuid.clone(),
            );
            inner.files.insert(meta.uuid.clone(), meta);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_meta(uuid: &str, chunks: u64) -> UploadDoneRequest {
        UploadDoneRequest {
            uuid: uuid.into(),
            name_encrypted: "bmFtZQ==".into(),
            name_hashed: "aa".repeat(32),
            size: chunks * 1024,
            chunks,
            sha256: "bb".repeat(32),
            key: "cc".repeat(32),
            parent: "folder-1".into(),
            region: "eu-central".into(),
            bucket: "bucket-1".into(),
            mime: String::new(),
        }
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = MemoryStore::new();
        store.put_chunk("f-1", 0, vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.get_chunk("f-1", 0).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn missing_chunk_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get_chunk("f-1", 7).await.unwrap_err();
        assert_eq!(err.code, ERR_CODE_NOT_FOUND);
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn capacity_rejection_is_permanent() {
        let store = MemoryStore::new();
        store.set_capacity(4);
        store.put_chunk("f-1", 0, vec![0; 4]).await.unwrap();
        let err = store.put_chunk("f-1", 1, vec![0; 1]).await.unwrap_err();
        assert_eq!(err.code, ERR_CODE_INSUFFICIENT_STORAGE);
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn finalize_requires_all_chunks() {
        let store = MemoryStore::new();
        store.put_chunk("f-1", 0, vec![0; 8]).await.unwrap();
        // Claims 2 chunks but only one is present.
        let err = store.finalize(sample_meta("f-1", 2)).await.unwrap_err();
        assert_eq!(err.code, ERR_CODE_BAD_REQUEST);

        store.put_chunk("f-1", 1, vec![0; 8]).await.unwrap();
        store.finalize(sample_meta("f-1", 2)).await.unwrap();
        assert!(store.file_meta("f-1").is_some());
    }

    #[tokio::test]
    async fn finalize_zero_chunk_file() {
        let store = MemoryStore::new();
        store.finalize(sample_meta("f-empty", 0)).await.unwrap();
        assert!(store.file_meta("f-empty").is_some());
    }

    #[tokio::test]
    async fn double_finalize_conflicts() {
        let store = MemoryStore::new();
        store.finalize(sample_meta("f-1", 0)).await.unwrap();
        let err = store.finalize(sample_meta("f-1", 0)).await.unwrap_err();
        assert_eq!(err.code, ERR_CODE_CONFLICT);
    }

    #[tokio::test]
    async fn existence_by_location() {
        let store = MemoryStore::new();
        assert!(
            store
                .file_exists("folder-1", &"aa".repeat(32))
                .await
                .unwrap()
                .is_none()
        );

        store.seed_file(sample_meta("f-1", 0));
        let found = store
            .file_exists("folder-1", &"aa".repeat(32))
            .await
            .unwrap();
        assert_eq!(found.as_deref(), Some("f-1"));

        // Same name under a different parent is a different file.
        assert!(
            store
                .file_exists("folder-2", &"aa".repeat(32))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn chunk_indices_reports_stored_set() {
        let store = MemoryStore::new();
        for i in [2u64, 0, 1] {
            store.put_chunk("f-1", i, vec![0; 4]).await.unwrap();
        }
        store.put_chunk("f-2", 9, vec![0; 4]).await.unwrap();

        let mut indices = store.chunk_indices("f-1");
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
