//! Chunk encryption, hashing, and key derivation.
//!
//! Chunks are sealed with AES-256-GCM under the per-file key. The 12-byte
//! nonce is generated fresh per chunk and prefixed to the ciphertext, so a
//! stored chunk is `nonce || ciphertext || tag` and decrypts standalone.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256, Sha512};

/// AES-256 key size in bytes.
pub const KEY_BYTES: usize = 32;

/// AES-GCM nonce size in bytes.
pub const NONCE_BYTES: usize = 12;

/// Errors from crypto primitives.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key")]
    InvalidKey,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("ciphertext too short")]
    TruncatedCiphertext,
}

/// Decodes a hex-encoded 32-byte key.
pub fn decode_key(key_hex: &str) -> Result<[u8; KEY_BYTES], CryptoError> {
    let bytes = hex::decode(key_hex).map_err(|_| CryptoError::InvalidKey)?;
    bytes.try_into().map_err(|_| CryptoError::InvalidKey)
}

/// Encrypts `plaintext` under `key`, returning nonce-prefixed ciphertext.
pub fn encrypt_chunk(key: &[u8; KEY_BYTES], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;

    let mut nonce_bytes = [0u8; NONCE_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::InvalidKey)?;

    let mut out = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts nonce-prefixed ciphertext produced by [`encrypt_chunk`].
pub fn decrypt_chunk(key: &[u8; KEY_BYTES], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_BYTES {
        return Err(CryptoError::TruncatedCiphertext);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
    let (nonce_bytes, ciphertext) = data.split_at(NONCE_BYTES);
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Derives a 32-byte key from a password with PBKDF2-HMAC-SHA512.
pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_BYTES] {
    let mut out = [0u8; KEY_BYTES];
    pbkdf2::pbkdf2_hmac::<Sha512>(password.as_bytes(), salt, iterations, &mut out);
    out
}

/// Generates a fresh random file key.
pub fn generate_key() -> [u8; KEY_BYTES] {
    let mut key = [0u8; KEY_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = generate_key();
        let plaintext = b"chunk payload bytes";

        let sealed = encrypt_chunk(&key, plaintext).unwrap();
        assert_ne!(&sealed[NONCE_BYTES..], plaintext.as_slice());

        let opened = decrypt_chunk(&key, &sealed).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn fresh_nonce_per_chunk() {
        let key = generate_key();
        let a = encrypt_chunk(&key, b"same input").unwrap();
        let b = encrypt_chunk(&key, b"same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = encrypt_chunk(&generate_key(), b"secret").unwrap();
        let result = decrypt_chunk(&generate_key(), &sealed);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = generate_key();
        let mut sealed = encrypt_chunk(&key, b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(decrypt_chunk(&key, &sealed).is_err());
    }

    #[test]
    fn truncated_ciphertext_rejected() {
        let key = generate_key();
        let result = decrypt_chunk(&key, &[0u8; NONCE_BYTES - 1]);
        assert!(matches!(result, Err(CryptoError::TruncatedCiphertext)));
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        // Zero-byte files still produce a valid (tag-only) chunk if ever
        // encrypted; the engine normally skips chunk jobs for them.
        let key = generate_key();
        let sealed = encrypt_chunk(&key, b"").unwrap();
        assert_eq!(decrypt_chunk(&key, &sealed).unwrap(), b"");
    }

    #[test]
    fn key_decode_validates_length() {
        assert!(decode_key(&"ab".repeat(32)).is_ok());
        assert!(decode_key("abcd").is_err());
        assert!(decode_key("not hex at all").is_err());
    }

    #[test]
    fn derive_key_is_deterministic() {
        let a = derive_key("hunter2", b"salt-bytes", 1000);
        let b = derive_key("hunter2", b"salt-bytes", 1000);
        assert_eq!(a, b);

        let c = derive_key("hunter2", b"other-salt", 1000);
        assert_ne!(a, c);
    }

    #[test]
    fn sha256_hex_known_vector() {
        // SHA-256 of the empty string.
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(sha256_hex(b"abc").len(), 64);
    }
}
