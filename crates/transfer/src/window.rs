//! Bounded-window chunk dispatch shared by the upload and download drivers.

use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::debug;

use crate::{TransferControl, TransferError};

/// How a window run ended.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum WindowOutcome {
    Completed,
    Stopped,
}

/// Drives chunk jobs `[0, total_chunks)` with at most `window` in flight.
///
/// Completions arrive in any order and are forwarded on `chunk_tx` as they
/// land. New jobs are gated on the pause signal; a stop request returns
/// immediately — dropping the join set discards in-flight results, whose
/// bridge calls cannot be interrupted mid-flight anyway.
pub(crate) async fn drive_window<F, Fut>(
    total_chunks: u64,
    window: usize,
    control: &TransferControl,
    chunk_tx: &mpsc::Sender<u64>,
    spawn_chunk: F,
) -> Result<WindowOutcome, TransferError>
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = Result<u64, TransferError>> + Send + 'static,
{
    let mut jobs: JoinSet<Result<u64, TransferError>> = JoinSet::new();
    let mut next_index = 0u64;
    let mut completed = 0u64;

    while completed < total_chunks {
        tokio::select! {
            () = control.cancelled() => {
                debug!(completed, total_chunks, "stop observed, abandoning window");
                return Ok(WindowOutcome::Stopped);
            }

            Some(res) = jobs.join_next(), if !jobs.is_empty() => {
                match res {
                    Ok(Ok(index)) => {
                        completed += 1;
                        let _ = chunk_tx.send(index).await;
                    }
                    Ok(Err(e)) => return Err(e),
                    Err(e) => {
                        return Err(TransferError::Internal(format!("chunk task failed: {e}")));
                    }
                }
            }

            () = control.wait_unpaused(), if jobs.len() < window && next_index < total_chunks => {
                jobs.spawn(spawn_chunk(next_index));
                next_index += 1;
            }
        }
    }

    Ok(WindowOutcome::Completed)
}
