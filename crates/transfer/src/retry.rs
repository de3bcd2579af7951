//! Bounded retry for network-dependent steps.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use vaultdrive_bridge::BridgeError;
use vaultdrive_protocol::constants::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};

/// Bounded-retry parameters for one network-dependent step.
///
/// Transient failures (timeouts, an unresponsive worker, 5xx-equivalent
/// worker errors) are retried up to `max_attempts` total attempts with a
/// fixed `delay` between them. Permanent rejections propagate immediately.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Runs `op` under the policy, returning the first success or the last error.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, BridgeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BridgeError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                warn!(attempt, max = policy.max_attempts, error = %e, "transient failure, retrying");
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
