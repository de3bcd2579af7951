//! Reference crypto/IO worker.
//!
//! Sits on the far side of the bridge: decodes request frames, performs the
//! CPU-bound encryption/decryption/hashing and raw chunk I/O the engine
//! never does itself, and answers with correlated replies. Chunk bytes reach
//! the remote through the [`ChunkStore`] seam; the in-memory implementation
//! backs tests and local use, and a real object-store HTTP client plugs in
//! behind the same trait.

pub mod crypto;
pub mod store;

mod handlers;
mod worker;

pub use store::{ChunkStore, MemoryStore, StoreFuture};
pub use worker::Worker;
