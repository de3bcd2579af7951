//! Events published to the application layer.

use uuid::Uuid;

use vaultdrive_protocol::types::TransferState;

/// Engine event stream payload.
///
/// Progress events are throttled to the configured interval; terminal
/// events always emit immediately. Events are advisory — the snapshot is
/// the authoritative view, so an unconsumed stream may drop progress
/// updates rather than stall the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// Periodic (or state-change) progress update for one transfer.
    Progress {
        id: Uuid,
        percent: f64,
        state: TransferState,
    },
    /// A transfer reached `Done`, `Failed`, or `Stopped`.
    Terminal {
        id: Uuid,
        state: TransferState,
        error: Option<String>,
    },
}

impl TransferEvent {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Progress { id, .. } | Self::Terminal { id, .. } => *id,
        }
    }

    pub fn state(&self) -> TransferState {
        match self {
            Self::Progress { state, .. } | Self::Terminal { state, .. } => *state,
        }
    }
}
