use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Crypto primitive payloads
// ---------------------------------------------------------------------------

/// Encrypts a small in-memory buffer (metadata, thumbnails).
///
/// Bulk file data never crosses the bridge; chunk operations carry paths and
/// byte ranges instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptDataRequest {
    /// Hex-encoded 32-byte AES-256-GCM key.
    pub key: String,
    /// Base64-encoded plaintext.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptDataResponse {
    /// Base64-encoded nonce-prefixed ciphertext.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptDataRequest {
    pub key: String,
    /// Base64-encoded nonce-prefixed ciphertext.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptDataResponse {
    /// Base64-encoded plaintext.
    pub data: String,
}

/// Hashes a buffer with SHA-256.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashDataRequest {
    /// Base64-encoded input.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashDataResponse {
    /// Hex-encoded SHA-256 digest.
    pub digest: String,
}

/// Derives a file/master key from a password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeriveKeyRequest {
    pub password: String,
    /// Hex-encoded salt.
    pub salt: String,
    pub iterations: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeriveKeyResponse {
    /// Hex-encoded 32-byte key.
    pub key: String,
}

/// Generates a signing keypair for the account (sharing/auth).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateKeypairResponse {
    /// Base64-encoded public key.
    pub public_key: String,
    /// Base64-encoded private key.
    pub private_key: String,
}

// ---------------------------------------------------------------------------
// Chunk I/O payloads
// ---------------------------------------------------------------------------

/// Reads a byte range from a local file, encrypts it, and uploads it as one
/// chunk of the given remote file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptAndUploadChunkRequest {
    /// Remote file uuid the chunk belongs to.
    pub uuid: String,
    pub index: u64,
    /// Plaintext byte offset within the local file.
    pub offset: u64,
    /// Plaintext length of this chunk.
    pub length: u64,
    pub local_path: String,
    /// Hex-encoded file key.
    pub key: String,
    pub bucket: String,
    pub region: String,
    pub parent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadResponse {
    pub index: u64,
    /// Hex-encoded SHA-256 of the stored ciphertext.
    pub checksum: String,
    /// Ciphertext size in bytes.
    pub size: u64,
}

/// Downloads one chunk of a remote file, decrypts it, and writes the
/// plaintext to `destination` (a per-transfer temp file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadAndDecryptChunkRequest {
    pub uuid: String,
    pub region: String,
    pub bucket: String,
    pub index: u64,
    /// Hex-encoded file key.
    pub key: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDownloadResponse {
    pub index: u64,
    /// Plaintext size written to `destination`.
    pub size: u64,
}

// ---------------------------------------------------------------------------
// Remote metadata API payloads
// ---------------------------------------------------------------------------

/// Asks whether a file already exists at `(parent, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileExistsRequest {
    pub parent: String,
    /// Hex-encoded SHA-256 of the lowercased plaintext name; the remote
    /// only ever sees hashed names.
    pub name_hashed: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileExistsResponse {
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

/// Registers an uploaded file's metadata, making it visible remotely.
///
/// Until this call succeeds the uploaded chunks are orphans and the transfer
/// is not complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDoneRequest {
    pub uuid: String,
    /// Encrypted (base64) file name.
    pub name_encrypted: String,
    pub name_hashed: String,
    pub size: u64,
    pub chunks: u64,
    /// Hex-encoded SHA-256 of the whole plaintext file.
    pub sha256: String,
    /// Hex-encoded file key, itself encrypted with the master key upstream.
    pub key: String,
    pub parent: String,
    pub region: String,
    pub bucket: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mime: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDoneResponse {
    pub uuid: String,
}

// ---------------------------------------------------------------------------
// Worker-originated event payloads
// ---------------------------------------------------------------------------

/// Chunk-level progress emitted by the worker while a chunk op is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkProgressEvent {
    pub uuid: String,
    pub index: u64,
    pub bytes: u64,
}
