//! Request dispatch: one handler per operation.

use std::io::SeekFrom;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tracing::warn;

use vaultdrive_protocol::OpKind;
use vaultdrive_protocol::constants::{
    ERR_CODE_BAD_REQUEST, ERR_CODE_INTERNAL, ERR_CODE_INVALID_KEY, ERR_CODE_NOT_FOUND,
};
use vaultdrive_protocol::envelope::{EventFrame, EventKind, ReplyFrame, RequestFrame};
use vaultdrive_protocol::messages::{
    ChunkDownloadResponse, ChunkProgressEvent, ChunkUploadResponse, DecryptDataRequest,
    DecryptDataResponse, DeriveKeyRequest, DeriveKeyResponse, DownloadAndDecryptChunkRequest,
    EncryptAndUploadChunkRequest, EncryptDataRequest, EncryptDataResponse, FileExistsRequest,
    FileExistsResponse, GenerateKeypairResponse, HashDataRequest, HashDataResponse,
    UploadDoneRequest, UploadDoneResponse,
};

use crate::crypto;
use crate::store::ChunkStore;

/// Routes a parsed request frame to its handler and returns the reply.
pub(crate) async fn dispatch(
    store: &Arc<dyn ChunkStore>,
    events: &mpsc::Sender<String>,
    frame: RequestFrame,
) -> ReplyFrame {
    let id = frame.id;
    match frame.op {
        OpKind::EncryptData => match frame.parse_payload::<EncryptDataRequest>() {
            Ok(req) => encrypt_data(id, req),
            Err(e) => bad_payload(id, e),
        },
        OpKind::DecryptData => match frame.parse_payload::<DecryptDataRequest>() {
            Ok(req) => decrypt_data(id, req),
            Err(e) => bad_payload(id, e),
        },
        OpKind::HashData => match frame.parse_payload::<HashDataRequest>() {
            Ok(req) => hash_data(id, req),
            Err(e) => bad_payload(id, e),
        },
        OpKind::DeriveKeyFromPassword => match frame.parse_payload::<DeriveKeyRequest>() {
            Ok(req) => derive_key(id, req),
            Err(e) => bad_payload(id, e),
        },
        OpKind::GenerateKeypair => generate_keypair(id),
        OpKind::EncryptAndUploadChunk => {
            match frame.parse_payload::<EncryptAndUploadChunkRequest>() {
                Ok(req) => encrypt_and_upload_chunk(store, events, id, req).await,
                Err(e) => bad_payload(id, e),
            }
        }
        OpKind::DownloadAndDecryptChunk => {
            match frame.parse_payload::<DownloadAndDecryptChunkRequest>() {
                Ok(req) => download_and_decrypt_chunk(store, events, id, req).await,
                Err(e) => bad_payload(id, e),
            }
        }
        OpKind::FileExists => match frame.parse_payload::<FileExistsRequest>() {
            Ok(req) => file_exists(store, id, req).await,
            Err(e) => bad_payload(id, e),
        },
        OpKind::UploadDone => match frame.parse_payload::<UploadDoneRequest>() {
            Ok(req) => upload_done(store, id, req).await,
            Err(e) => bad_payload(id, e),
        },
        OpKind::Shutdown | OpKind::Unknown => {
            ReplyFrame::error(id, ERR_CODE_BAD_REQUEST, "unsupported operation")
        }
    }
}

fn reply_ok<T: Serialize>(id: u64, value: &T) -> ReplyFrame {
    ReplyFrame::ok(id, value)
        .unwrap_or_else(|e| ReplyFrame::error(id, ERR_CODE_INTERNAL, e.to_string()))
}

fn bad_payload(id: u64, e: serde_json::Error) -> ReplyFrame {
    ReplyFrame::error(id, ERR_CODE_BAD_REQUEST, format!("bad payload: {e}"))
}

fn io_error(id: u64, e: &std::io::Error) -> ReplyFrame {
    let code = if e.kind() == std::io::ErrorKind::NotFound {
        ERR_CODE_NOT_FOUND
    } else {
        ERR_CODE_INTERNAL
    };
    ReplyFrame::error(id, code, format!("I/O error: {e}"))
}

// ---------------------------------------------------------------------------
// Crypto primitives
// ---------------------------------------------------------------------------

fn encrypt_data(id: u64, req: EncryptDataRequest) -> ReplyFrame {
    let Ok(key) = crypto::decode_key(&req.key) else {
        return ReplyFrame::error(id, ERR_CODE_INVALID_KEY, "invalid key");
    };
    let Ok(plain) = BASE64.decode(&req.data) else {
        return ReplyFrame::error(id, ERR_CODE_BAD_REQUEST, "invalid base64 data");
    };
    match crypto::encrypt_chunk(&key, &plain) {
        Ok(sealed) => reply_ok(
            id,
            &EncryptDataResponse {
                data: BASE64.encode(sealed),
            },
        ),
        Err(e) => ReplyFrame::error(id, ERR_CODE_INVALID_KEY, e.to_string()),
    }
}

fn decrypt_data(id: u64, req: DecryptDataRequest) -> ReplyFrame {
    let Ok(key) = crypto::decode_key(&req.key) else {
        return ReplyFrame::error(id, ERR_CODE_INVALID_KEY, "invalid key");
    };
    let Ok(sealed) = BASE64.decode(&req.data) else {
        return ReplyFrame::error(id, ERR_CODE_BAD_REQUEST, "invalid base64 data");
    };
    match crypto::decrypt_chunk(&key, &sealed) {
        Ok(plain) => reply_ok(
            id,
            &DecryptDataResponse {
                data: BASE64.encode(plain),
            },
        ),
        Err(e) => ReplyFrame::error(id, ERR_CODE_INVALID_KEY, e.to_string()),
    }
}

fn hash_data(id: u64, req: HashDataRequest) -> ReplyFrame {
    let Ok(data) = BASE64.decode(&req.data) else {
        return ReplyFrame::error(id, ERR_CODE_BAD_REQUEST, "invalid base64 data");
    };
    reply_ok(
        id,
        &HashDataResponse {
            digest: crypto::sha256_hex(&data),
        },
    )
}

fn derive_key(id: u64, req: DeriveKeyRequest) -> ReplyFrame {
    let Ok(salt) = hex::decode(&req.salt) else {
        return ReplyFrame::error(id, ERR_CODE_BAD_REQUEST, "invalid salt");
    };
    let key = crypto::derive_key(&req.password, &salt, req.iterations);
    reply_ok(
        id,
        &DeriveKeyResponse {
            key: hex::encode(key),
        },
    )
}

fn generate_keypair(id: u64) -> ReplyFrame {
    let signing = ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng);
    let verifying = signing.verifying_key();
    reply_ok(
        id,
        &GenerateKeypairResponse {
            public_key: BASE64.encode(verifying.to_bytes()),
            private_key: BASE64.encode(signing.to_bytes()),
        },
    )
}

// ---------------------------------------------------------------------------
// Chunk I/O
// ---------------------------------------------------------------------------

async fn encrypt_and_upload_chunk(
    store: &Arc<dyn ChunkStore>,
    events: &mpsc::Sender<String>,
    id: u64,
    req: EncryptAndUploadChunkRequest,
) -> ReplyFrame {
    let Ok(key) = crypto::decode_key(&req.key) else {
        return ReplyFrame::error(id, ERR_CODE_INVALID_KEY, "invalid key");
    };

    let plain = match read_range(&req.local_path, req.offset, req.length).await {
        Ok(buf) => buf,
        Err(e) => return io_error(id, &e),
    };

    // AEAD work is CPU-bound; keep it off the worker's dispatch threads.
    let sealed = match tokio::task::spawn_blocking(move || crypto::encrypt_chunk(&key, &plain))
        .await
    {
        Ok(Ok(sealed)) => sealed,
        Ok(Err(e)) => return ReplyFrame::error(id, ERR_CODE_INVALID_KEY, e.to_string()),
        Err(e) => return ReplyFrame::error(id, ERR_CODE_INTERNAL, format!("join error: {e}")),
    };

    let checksum = crypto::sha256_hex(&sealed);
    let size = sealed.len() as u64;

    if let Err(err) = store.put_chunk(&req.uuid, req.index, sealed).await {
        return ReplyFrame {
            id,
            response: None,
            err: Some(err),
        };
    }

    emit_chunk_progress(events, &req.uuid, req.index, req.length).await;

    reply_ok(
        id,
        &ChunkUploadResponse {
            index: req.index,
            checksum,
            size,
        },
    )
}

async fn download_and_decrypt_chunk(
    store: &Arc<dyn ChunkStore>,
    events: &mpsc::Sender<String>,
    id: u64,
    req: DownloadAndDecryptChunkRequest,
) -> ReplyFrame {
    let Ok(key) = crypto::decode_key(&req.key) else {
        return ReplyFrame::error(id, ERR_CODE_INVALID_KEY, "invalid key");
    };

    let sealed = match store.get_chunk(&req.uuid, req.index).await {
        Ok(data) => data,
        Err(err) => {
            return ReplyFrame {
                id,
                response: None,
                err: Some(err),
            };
        }
    };

    let plain = match tokio::task::spawn_blocking(move || crypto::decrypt_chunk(&key, &sealed))
        .await
    {
        Ok(Ok(plain)) => plain,
        Ok(Err(e)) => return ReplyFrame::error(id, ERR_CODE_INVALID_KEY, e.to_string()),
        Err(e) => return ReplyFrame::error(id, ERR_CODE_INTERNAL, format!("join error: {e}")),
    };

    if let Some(parent) = std::path::Path::new(&req.destination).parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return io_error(id, &e);
        }
    }
    let size = plain.len() as u64;
    if let Err(e) = tokio::fs::write(&req.destination, plain).await {
        return io_error(id, &e);
    }

    emit_chunk_progress(events, &req.uuid, req.index, size).await;

    reply_ok(
        id,
        &ChunkDownloadResponse {
            index: req.index,
            size,
        },
    )
}

/// Reads `[offset, offset+length)` from a local file.
async fn read_range(path: &str, offset: u64, length: u64) -> std::io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = vec![0u8; length as usize];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

async fn emit_chunk_progress(events: &mpsc::Sender<String>, uuid: &str, index: u64, bytes: u64) {
    let payload = ChunkProgressEvent {
        uuid: uuid.to_string(),
        index,
        bytes,
    };
    let frame = EventFrame {
        kind: EventKind::ChunkProgress,
        data: serde_json::to_value(&payload).ok(),
    };
    match serde_json::to_string(&frame) {
        Ok(json) => {
            let _ = events.send(json).await;
        }
        Err(e) => warn!("failed to encode chunk progress event: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Remote metadata API
// ---------------------------------------------------------------------------

async fn file_exists(store: &Arc<dyn ChunkStore>, id: u64, req: FileExistsRequest) -> ReplyFrame {
    match store.file_exists(&req.parent, &req.name_hashed).await {
        Ok(uuid) => reply_ok(
            id,
            &FileExistsResponse {
                exists: uuid.is_some(),
                uuid,
            },
        ),
        Err(err) => ReplyFrame {
            id,
            response: None,
            err: Some(err),
        },
    }
}

async fn upload_done(store: &Arc<dyn ChunkStore>, id: u64, req: UploadDoneRequest) -> ReplyFrame {
    let uuid = req.uuid.clone();
    match store.finalize(req).await {
        Ok(()) => reply_ok(id, &UploadDoneResponse { uuid }),
        Err(err) => ReplyFrame {
            id,
            response: None,
            err: Some(err),
        },
    }
}
