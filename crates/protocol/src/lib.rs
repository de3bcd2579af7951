//! Wire protocol for VaultDrive engine-worker communication.
//!
//! The engine never performs crypto or raw chunk I/O itself; it sends typed
//! requests to an isolated worker and awaits typed responses correlated by
//! request id. Everything crossing that boundary is defined here.

pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;

pub use constants::OpKind;
pub use envelope::{EventFrame, ReplyFrame, RequestFrame, WorkerError};
