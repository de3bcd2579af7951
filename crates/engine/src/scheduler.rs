//! Transfer queue and scheduler.
//!
//! Owns the transfer set exclusively. Admission is FIFO by enqueue time
//! under the configured concurrency cap; each admitted transfer runs in its
//! own task driving the chunk transfer primitive. Pause gates new chunk
//! dispatch, stop frees the slot immediately (trailing chunk results are
//! discarded on arrival), and every failure lands in the transfer record
//! rather than escaping the scheduler.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rand::RngCore;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vaultdrive_bridge::WorkerBridge;
use vaultdrive_protocol::types::{
    FileDescriptor, ProgressSnapshot, Transfer, TransferKind, TransferState,
};
use vaultdrive_transfer::{
    DownloadSpec, TransferControl, TransferControlHandle, TransferOutcome, UploadSpec,
    chunk_count, chunk_len, hashed_name, run_download, run_upload,
};

use crate::events::TransferEvent;
use crate::progress::SpeedMeter;
use crate::{EngineConfig, EngineError};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const CHUNK_CHANNEL_CAPACITY: usize = 256;

/// Request to move a local file into a remote folder.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub local_path: String,
    pub name: String,
    /// Destination folder uuid.
    pub parent: String,
    pub mime: String,
}

/// Request to fetch a remote file to a local destination path.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub file: FileDescriptor,
    pub destination: String,
}

/// The tracked transfer lists, as handed to the application layer.
#[derive(Debug, Clone)]
pub struct CurrentTransfers {
    pub active: Vec<Transfer>,
    pub finished: Vec<Transfer>,
}

#[derive(Clone)]
enum TransferWork {
    Upload(UploadSpec),
    Download(DownloadSpec),
}

struct TransferEntry {
    record: Transfer,
    handle: TransferControlHandle,
    control: TransferControl,
    work: TransferWork,
    /// Bytes this transfer contributed to the aggregate counters.
    bytes_counted: u64,
}

#[derive(Default)]
struct TransferTable {
    ongoing: HashMap<Uuid, TransferEntry>,
    queue: VecDeque<Uuid>,
    finished: Vec<Transfer>,
    /// Transfers with unpublished chunk progress, flushed by the ticker.
    dirty: HashSet<Uuid>,
    all_bytes: u64,
    bytes_done: u64,
}

struct EngineInner {
    bridge: Arc<WorkerBridge>,
    config: EngineConfig,
    table: Mutex<TransferTable>,
    events_tx: mpsc::Sender<TransferEvent>,
    speed: SpeedMeter,
}

/// The transfer engine: queue, scheduler, and event publisher.
pub struct TransferEngine {
    inner: Arc<EngineInner>,
    events_rx: Mutex<Option<mpsc::Receiver<TransferEvent>>>,
    ticker_cancel: CancellationToken,
}

impl TransferEngine {
    /// Creates an engine on top of a connected worker bridge.
    pub fn new(bridge: Arc<WorkerBridge>, config: EngineConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let inner = Arc::new(EngineInner {
            bridge,
            config,
            table: Mutex::new(TransferTable::default()),
            events_tx,
            speed: SpeedMeter::new(),
        });

        let ticker_cancel = CancellationToken::new();
        tokio::spawn(progress_ticker(inner.clone(), ticker_cancel.clone()));

        Self {
            inner,
            events_rx: Mutex::new(Some(events_rx)),
            ticker_cancel,
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<TransferEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Enqueues an upload and returns its transfer id.
    ///
    /// The file is stat'ed here so the chunk count is fixed at enqueue time;
    /// a fresh uuid and file key are assigned.
    pub async fn enqueue_upload(&self, req: UploadRequest) -> Result<Uuid, EngineError> {
        let meta = tokio::fs::metadata(&req.local_path).await?;
        if !meta.is_file() {
            return Err(EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a file", req.local_path),
            )));
        }
        let size = meta.len();

        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);

        let config = &self.inner.config;
        let file = FileDescriptor {
            uuid: Uuid::new_v4().to_string(),
            name: req.name.clone(),
            size,
            chunks: chunk_count(size, config.chunk_size),
            region: config.default_region.clone(),
            bucket: config.default_bucket.clone(),
            key: hex::encode(key),
            version: 2,
        };
        let spec = UploadSpec {
            file: file.clone(),
            local_path: req.local_path.clone(),
            parent: req.parent.clone(),
            name_hashed: hashed_name(&req.name),
            mime: req.mime,
        };

        let id = Uuid::new_v4();
        self.enqueue(
            id,
            TransferKind::Upload,
            file,
            req.local_path,
            req.parent,
            TransferWork::Upload(spec),
        )
        .await;
        Ok(id)
    }

    /// Enqueues a download and returns its transfer id.
    pub async fn enqueue_download(&self, req: DownloadRequest) -> Result<Uuid, EngineError> {
        let id = Uuid::new_v4();
        let temp_dir = self
            .inner
            .config
            .temp_base()
            .join(id.to_string())
            .to_string_lossy()
            .into_owned();
        let spec = DownloadSpec {
            file: req.file.clone(),
            destination: req.destination.clone(),
            temp_dir,
        };
        self.enqueue(
            id,
            TransferKind::Download,
            req.file,
            req.destination,
            String::new(),
            TransferWork::Download(spec),
        )
        .await;
        Ok(id)
    }

    async fn enqueue(
        &self,
        id: Uuid,
        kind: TransferKind,
        file: FileDescriptor,
        local_path: String,
        remote_parent: String,
        work: TransferWork,
    ) {
        let total_chunks = file.chunks;
        let (handle, control) = TransferControlHandle::new();
        let record = Transfer {
            id,
            kind,
            file,
            local_path,
            remote_parent,
            state: TransferState::Queued,
            chunks_done: 0,
            total_chunks,
            queued_at: chrono::Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        };
        let percent = record.percent();

        {
            let mut table = self.inner.table.lock().await;
            table.ongoing.insert(
                id,
                TransferEntry {
                    record,
                    handle,
                    control,
                    work,
                    bytes_counted: 0,
                },
            );
            table.queue.push_back(id);
        }
        info!(%id, ?kind, total_chunks, "transfer enqueued");
        emit_progress_now(&self.inner, id, percent, TransferState::Queued);

        pump_admissions(&self.inner).await;
    }

    /// Pauses an active transfer. Returns `false` when not applicable
    /// (unknown id, already paused, or terminal).
    pub async fn pause(&self, id: Uuid) -> bool {
        let percent = {
            let mut table = self.inner.table.lock().await;
            let Some(entry) = table.ongoing.get_mut(&id) else {
                return false;
            };
            if entry.record.state != TransferState::Active {
                return false;
            }
            entry.handle.pause();
            entry.record.state = TransferState::Paused;
            entry.record.percent()
        };
        debug!(%id, "transfer paused");
        emit_progress_now(&self.inner, id, percent, TransferState::Paused);
        true
    }

    /// Resumes a paused transfer. Returns `false` when not applicable.
    pub async fn resume(&self, id: Uuid) -> bool {
        let percent = {
            let mut table = self.inner.table.lock().await;
            let Some(entry) = table.ongoing.get_mut(&id) else {
                return false;
            };
            if entry.record.state != TransferState::Paused {
                return false;
            }
            entry.handle.resume();
            entry.record.state = TransferState::Active;
            entry.record.percent()
        };
        debug!(%id, "transfer resumed");
        emit_progress_now(&self.inner, id, percent, TransferState::Active);
        true
    }

    /// Stops a queued, active, or paused transfer.
    ///
    /// The transfer reports `Stopped` and frees its concurrency slot
    /// immediately; in-flight chunk calls cannot be interrupted, so their
    /// results are discarded when they arrive.
    pub async fn stop(&self, id: Uuid) -> bool {
        {
            let mut guard = self.inner.table.lock().await;
            let table = &mut *guard;
            let Some(mut entry) = table.ongoing.remove(&id) else {
                return false;
            };
            table.queue.retain(|queued| *queued != id);
            entry.handle.stop();

            entry.record.state = TransferState::Stopped;
            entry.record.finished_at = Some(chrono::Utc::now());
            if entry.record.started_at.is_some() {
                table.all_bytes = table.all_bytes.saturating_sub(entry.record.file.size);
                table.bytes_done = table.bytes_done.saturating_sub(entry.bytes_counted);
            }
            table.dirty.remove(&id);
            table.finished.push(entry.record.clone());
            if table.ongoing.is_empty() {
                table.all_bytes = 0;
                table.bytes_done = 0;
                self.inner.speed.reset();
            }
        }
        info!(%id, "transfer stopped");
        let _ = self.inner.events_tx.try_send(TransferEvent::Terminal {
            id,
            state: TransferState::Stopped,
            error: None,
        });

        pump_admissions(&self.inner).await;
        true
    }

    /// Drops a terminal transfer from the finished list.
    pub async fn remove(&self, id: Uuid) -> bool {
        let mut table = self.inner.table.lock().await;
        let before = table.finished.len();
        table.finished.retain(|t| t.id != id);
        table.finished.len() != before
    }

    /// Recomputed aggregate view over the live transfer set.
    pub async fn snapshot(&self) -> ProgressSnapshot {
        let table = self.inner.table.lock().await;
        let mut active = HashMap::new();
        for (id, entry) in &table.ongoing {
            active.insert(*id, entry.record.percent());
        }

        let ongoing_count = table.ongoing.len();
        let progress = if ongoing_count == 0 {
            0.0
        } else if table.all_bytes == 0 {
            100.0
        } else {
            ((table.bytes_done as f64 / table.all_bytes as f64) * 100.0).clamp(0.0, 100.0)
        };

        let speed = self.inner.speed.bytes_per_second();
        let remaining_bytes = table.all_bytes.saturating_sub(table.bytes_done);
        let remaining = if speed > 0.0 && ongoing_count > 0 {
            (remaining_bytes as f64 / speed).ceil() as u64
        } else {
            0
        };

        ProgressSnapshot {
            active,
            active_count: ongoing_count,
            finished_count: table.finished.len(),
            progress,
            speed,
            remaining,
        }
    }

    /// Clones of the tracked transfer records, enqueue-ordered.
    pub async fn current_transfers(&self) -> CurrentTransfers {
        let table = self.inner.table.lock().await;
        let mut active: Vec<Transfer> =
            table.ongoing.values().map(|e| e.record.clone()).collect();
        active.sort_by_key(|t| t.queued_at);
        CurrentTransfers {
            active,
            finished: table.finished.clone(),
        }
    }
}

impl Drop for TransferEngine {
    fn drop(&mut self) {
        self.ticker_cancel.cancel();
    }
}

/// Promotes queued transfers while slots are free, oldest first.
///
/// Returns a boxed, explicitly `Send` future so the mutual recursion with
/// `run_transfer` (which spawns admitted transfers) does not trip the
/// compiler's auto-trait `Send` inference cycle on the spawned future.
fn pump_admissions<'a>(
    inner: &'a Arc<EngineInner>,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
    loop {
        let admitted = {
            let mut guard = inner.table.lock().await;
            let table = &mut *guard;

            let occupied = table
                .ongoing
                .values()
                .filter(|e| {
                    matches!(
                        e.record.state,
                        TransferState::Active | TransferState::Paused
                    )
                })
                .count();
            if occupied >= inner.config.max_concurrent_transfers {
                return;
            }

            let Some(id) = table.queue.pop_front() else {
                return;
            };
            let Some(entry) = table.ongoing.get_mut(&id) else {
                // Stopped while queued; the slot stays free for the next one.
                continue;
            };
            if entry.record.state != TransferState::Queued {
                continue;
            }

            entry.record.state = TransferState::Active;
            entry.record.started_at = Some(chrono::Utc::now());
            table.all_bytes += entry.record.file.size;
            Some((id, entry.record.percent()))
        };

        if let Some((id, percent)) = admitted {
            info!(%id, "transfer admitted");
            emit_progress_now(inner, id, percent, TransferState::Active);
            tokio::spawn(run_transfer(inner.clone(), id));
        }
    }
    })
}

/// Drives one admitted transfer to a terminal state.
async fn run_transfer(inner: Arc<EngineInner>, id: Uuid) {
    let (work, control) = {
        let table = inner.table.lock().await;
        let Some(entry) = table.ongoing.get(&id) else {
            return;
        };
        (entry.work.clone(), entry.control.clone())
    };

    let settings = inner.config.chunk_settings();
    let policy = inner.config.retry_policy();
    let (chunk_tx, mut chunk_rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);

    // Route chunk completions into the record as they land (in any order).
    let forwarder = {
        let inner = inner.clone();
        tokio::spawn(async move {
            while let Some(index) = chunk_rx.recv().await {
                record_chunk_done(&inner, id, index).await;
            }
        })
    };

    let result = match work {
        TransferWork::Upload(spec) => {
            run_upload(inner.bridge.clone(), spec, settings, policy, control, chunk_tx).await
        }
        TransferWork::Download(spec) => {
            run_download(inner.bridge.clone(), spec, settings, policy, control, chunk_tx).await
        }
    };
    let _ = forwarder.await;

    match result {
        Ok(TransferOutcome::Completed) | Ok(TransferOutcome::AlreadyExists { .. }) => {
            finish_transfer(&inner, id, TransferState::Done, None).await;
        }
        Ok(TransferOutcome::Stopped) => {
            // stop() already published the terminal state.
            debug!(%id, "driver confirmed stop");
        }
        Err(e) => {
            finish_transfer(&inner, id, TransferState::Failed, Some(e.to_string())).await;
        }
    }

    pump_admissions(&inner).await;
}

/// Records one completed chunk job for `id`.
async fn record_chunk_done(inner: &Arc<EngineInner>, id: Uuid, index: u64) {
    let bytes = {
        let mut guard = inner.table.lock().await;
        let table = &mut *guard;
        let Some(entry) = table.ongoing.get_mut(&id) else {
            // Trailing completion after stop — discard.
            return;
        };
        entry.record.chunks_done = (entry.record.chunks_done + 1).min(entry.record.total_chunks);
        let bytes = chunk_len(entry.record.file.size, inner.config.chunk_size, index);
        entry.bytes_counted += bytes;
        table.bytes_done += bytes;
        table.dirty.insert(id);
        bytes
    };
    inner.speed.add_sample(bytes);
}

/// Moves a transfer to a terminal state and publishes the terminal event.
async fn finish_transfer(
    inner: &Arc<EngineInner>,
    id: Uuid,
    state: TransferState,
    error: Option<String>,
) {
    {
        let mut guard = inner.table.lock().await;
        let table = &mut *guard;
        let Some(mut entry) = table.ongoing.remove(&id) else {
            // Already stopped and reported; late driver result is discarded.
            return;
        };
        if !entry.record.state.can_transition(state) {
            warn!(%id, from = ?entry.record.state, to = ?state, "unexpected terminal transition");
        }

        entry.record.state = state;
        entry.record.finished_at = Some(chrono::Utc::now());
        entry.record.error = error.clone();
        if state == TransferState::Done {
            entry.record.chunks_done = entry.record.total_chunks;
        }
        if state == TransferState::Failed && entry.record.started_at.is_some() {
            table.all_bytes = table.all_bytes.saturating_sub(entry.record.file.size);
            table.bytes_done = table.bytes_done.saturating_sub(entry.bytes_counted);
        }

        table.dirty.remove(&id);
        table.finished.push(entry.record.clone());
        if table.ongoing.is_empty() {
            table.all_bytes = 0;
            table.bytes_done = 0;
            inner.speed.reset();
        }
    }

    match state {
        TransferState::Failed => {
            warn!(%id, error = error.as_deref().unwrap_or(""), "transfer failed")
        }
        _ => info!(%id, ?state, "transfer finished"),
    }
    let _ = inner
        .events_tx
        .try_send(TransferEvent::Terminal { id, state, error });
}

/// Timer-gated progress publisher: at most one progress event per transfer
/// per interval, flushing only transfers with fresh chunk completions.
async fn progress_ticker(inner: Arc<EngineInner>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(inner.config.progress_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let updates: Vec<(Uuid, f64, TransferState)> = {
                    let mut guard = inner.table.lock().await;
                    let table = &mut *guard;
                    let ids: Vec<Uuid> = table.dirty.drain().collect();
                    ids.into_iter()
                        .filter_map(|id| {
                            table
                                .ongoing
                                .get(&id)
                                .map(|e| (id, e.record.percent(), e.record.state))
                        })
                        .collect()
                };
                for (id, percent, state) in updates {
                    emit_progress_now(&inner, id, percent, state);
                }
            }
        }
    }
}

/// Publishes a progress event without waiting; the event stream is advisory
/// and must never stall the scheduler.
fn emit_progress_now(inner: &Arc<EngineInner>, id: Uuid, percent: f64, state: TransferState) {
    if let Err(e) = inner
        .events_tx
        .try_send(TransferEvent::Progress { id, percent, state })
    {
        debug!(%id, "progress event dropped: {e}");
    }
}
