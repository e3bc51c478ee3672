//! # Remote Call Retry
//!
//! Bounded exponential backoff around a single remote operation.
//!
//! Only transient failures ([`RemoteError::Network`] and
//! [`RemoteError::RateLimited`]) are repeated. Each attempt is bounded by a
//! per-call timeout, and both attempts and backoff sleeps race the run's
//! cancellation token.
//!
//! Backoff schedule with the defaults: 500ms, 1s, 2s (4 attempts), capped at
//! 30s. A `Retry-After` hint replaces the computed delay.

use bridge_traits::remote::{self, RemoteError};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Retry parameters for remote calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (minimum 1)
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that never repeats a call
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the attempt following failed attempt `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32, error: &RemoteError) -> Duration {
        let computed = error.retry_after().unwrap_or_else(|| {
            self.base_delay
                .saturating_mul(2u32.saturating_pow(attempt.min(16)))
        });
        computed.min(self.max_delay)
    }
}

/// Why a retried operation gave up
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// Terminal or exhausted remote failure (the last one seen)
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Run `operation` until it succeeds, fails terminally, or attempts run out
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    call_timeout: Duration,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = remote::Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 0..max_attempts {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            result = tokio::time::timeout(call_timeout, operation()) => result,
        };

        let error = match result {
            Ok(Ok(value)) => {
                if attempt > 0 {
                    info!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Ok(Err(error)) => error,
            Err(_) => RemoteError::Network(format!(
                "{} timed out after {}s",
                operation_name,
                call_timeout.as_secs_f64()
            )),
        };

        if !error.is_transient() || attempt + 1 >= max_attempts {
            return Err(RetryError::Remote(error));
        }

        let delay = policy.delay_for(attempt, &error);
        warn!(
            operation = operation_name,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Transient error, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }

    Err(RetryError::Cancelled)
}
