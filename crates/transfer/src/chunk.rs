//! Chunk arithmetic and file hashing.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Number of fixed-size chunks covering `size` bytes. Zero for empty files.
pub fn chunk_count(size: u64, chunk_size: u64) -> u64 {
    if size == 0 {
        return 0;
    }
    size.div_ceil(chunk_size)
}

/// Byte offset of chunk `index`.
pub fn chunk_offset(chunk_size: u64, index: u64) -> u64 {
    index * chunk_size
}

/// Plaintext length of chunk `index`; the final chunk may be short.
///
/// An out-of-range index yields 0 rather than panicking — descriptors come
/// from the remote and may disagree with the actual size.
pub fn chunk_len(size: u64, chunk_size: u64, index: u64) -> u64 {
    let offset = chunk_offset(chunk_size, index);
    if offset >= size {
        return 0;
    }
    chunk_size.min(size - offset)
}

/// Hashed form of a file name as the remote sees it.
///
/// The remote never learns plaintext names; existence checks compare
/// SHA-256 digests of the lowercased name.
pub fn hashed_name(name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
///
/// Synchronous; callers on the runtime wrap it in `spawn_blocking`.
pub fn file_sha256(path: &Path) -> Result<String, std::io::Error> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
