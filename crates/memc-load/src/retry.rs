//! Write retry policy
//!
//! A failed attempt asks the [`RetryStrategy`] how long to wait before the
//! next one. Every failure is treated the same; there is no jitter and no
//! growth between attempts.

use std::time::Duration;

use tracing::debug;

use crate::store::{StoreClient, StoreError};

/// Decides whether and when to retry after a failed attempt
pub trait RetryStrategy: Send + Sync {
    /// `failed_attempt` is the 1-based number of the attempt that just failed.
    /// `None` gives up.
    fn next_delay(&self, failed_attempt: u32) -> Option<Duration>;
}

/// Fixed number of attempts with a constant pause between them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl FixedBackoff {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Same attempt budget without waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }
}

impl RetryStrategy for FixedBackoff {
    fn next_delay(&self, failed_attempt: u32) -> Option<Duration> {
        (failed_attempt < self.max_attempts).then_some(self.backoff)
    }
}

/// All attempts for one key failed
#[derive(Debug)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last_error: StoreError,
}

/// `set` with retries. Returns the number of attempts made on success.
pub async fn set_with_retry(
    client: &dyn StoreClient,
    key: &str,
    value: &[u8],
    strategy: &dyn RetryStrategy,
) -> Result<u32, RetryExhausted> {
    let mut attempt = 0;

    loop {
        attempt += 1;

        let err = match client.set(key, value).await {
            Ok(()) => return Ok(attempt),
            Err(e) => e,
        };

        match strategy.next_delay(attempt) {
            Some(delay) => {
                debug!(key = %key, attempt, delay = ?delay, error = %err, "Store write failed, retrying");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            },
            None => {
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error: err,
                })
            },
        }
    }
}
