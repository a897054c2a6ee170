//! Bounded retry with exponential backoff and a per-attempt timeout.
//!
//! Every external call (embedding, generation) goes through
//! [`RetryPolicy::run`]. Transient failures and timeouts are retried up to
//! `max_attempts` total attempts; terminal failures return immediately.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::error::{Error, ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never zero.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound for a single attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetrySettings::default().policy()
    }
}

/// Serializable form of [`RetryPolicy`] used in configuration files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 500, max_delay_ms: 8_000, timeout_ms: 60_000 }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

/// The last failure once a call has given up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted {
    pub operation: &'static str,
    pub attempts: u32,
    pub last: ServiceError,
}

impl Exhausted {
    /// Timeouts become [`Error::Timeout`]; everything else goes through `wrap`
    /// (typically `Error::Embedding` or `Error::Generation`).
    pub fn into_error(self, wrap: fn(ServiceError) -> Error) -> Error {
        match self.last {
            ServiceError::Timeout(_) => Error::Timeout { operation: self.operation, attempts: self.attempts },
            other => wrap(other),
        }
    }
}

impl RetryPolicy {
    /// Policy with no waiting between attempts.
    pub fn immediate(max_attempts: u32, timeout: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay: Duration::ZERO, max_delay: Duration::ZERO, timeout }
    }

    /// Backoff before retry number `retry` (0 for the wait after the first failure).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.min(31)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut f: F) -> Result<T, Exhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match tokio::time::timeout(self.timeout, f()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => err,
                Err(_) => ServiceError::Timeout(self.timeout),
            };
            if !err.is_transient() || attempt >= max_attempts {
                if err.is_transient() {
                    tracing::warn!(operation, attempts = attempt, error = %err, "giving up after transient failures");
                }
                return Err(Exhausted { operation, attempts: attempt, last: err });
            }
            let delay = self.delay_for(attempt - 1);
            tracing::warn!(
                operation,
                attempt,
                max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
