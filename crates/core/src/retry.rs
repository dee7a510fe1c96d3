//! Bounded retry with verification.
//!
//! Secondary-index reads are eventually consistent with primary-table
//! writes. This module provides the generic retry engine: a read operation
//! is re-invoked with exponential backoff until an injected predicate
//! accepts its result or the attempt budget runs out. Transport errors and
//! predicate rejections draw from the same budget.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Error, Result};

/// Backoff configuration for one logical read-after-write operation.
///
/// Pure data; a fresh config accompanies each call, there is no shared
/// retry state.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before attempt `n + 1`, given `n` completed attempts:
    /// min(initial · factor^(n−1), max).
    pub fn delay_after(&self, completed_attempts: u32) -> Duration {
        let exponent = completed_attempts.saturating_sub(1);
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent as i32);
        Duration::from_secs_f64(scaled).min(self.max_delay)
    }
}

/// Repeatedly invokes `op` until `verify` accepts its result.
///
/// A predicate rejection is a retryable miss, not a success: the stale
/// result is never returned. Retryable errors (transport faults, not-found
/// during index propagation) consume the same budget; validation and
/// construction errors surface immediately. Exhausting the budget yields
/// [`Error::VerificationFailed`]. Cancellation observed between attempts or
/// during backoff yields [`Error::Cancelled`] without issuing further reads.
pub async fn retry_with_verification<T, Op, Fut, V>(
    mut op: Op,
    verify: V,
    config: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<T>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    V: Fn(&T) -> bool,
{
    let mut attempts = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        attempts += 1;

        match op().await {
            Ok(value) => {
                if verify(&value) {
                    return Ok(value);
                }
                warn!(attempt = attempts, "verification predicate rejected read result");
            }
            Err(err) if err.is_retryable() => {
                warn!(attempt = attempts, error = %err, "retryable read failure");
            }
            Err(err) => return Err(err),
        }

        if attempts >= config.max_attempts {
            return Err(Error::VerificationFailed { attempts });
        }

        let delay = config.delay_after(attempts);
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
