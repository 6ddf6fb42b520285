//! Retrying transport wrapper
//!
//! Wraps another transport and retries calls that fail with a transient
//! error, sleeping with a capped exponential backoff between attempts.

use super::{RpcTransport, TransportError};
use crate::value::Value;
use serde::Deserialize;
use std::thread;
use std::time::Duration;

/// Bounds for retrying transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
    /// Delay before the first retry, doubled for every further one
    #[serde(with = "millis")]
    pub initial_backoff: Duration,
    /// Upper bound for the delay between attempts
    #[serde(with = "millis")]
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (zero-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(16));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Transport decorator that retries transient failures
///
/// Non-transient failures are returned immediately. Once the retry budget is
/// spent the last error is returned wrapped in
/// [`TransportError::RetriesExhausted`].
#[derive(Debug)]
pub struct RetryingTransport<T> {
    /// The transport performing the actual calls
    inner: T,
    /// Retry bounds
    policy: RetryPolicy,
}

impl<T: RpcTransport> RetryingTransport<T> {
    /// Wraps `inner` with the given retry policy
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Returns the wrapped transport
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: RpcTransport> RpcTransport for RetryingTransport<T> {
    fn call(&self, method: &str, params: &[Value]) -> Result<Value, TransportError> {
        let mut retry = 0;
        loop {
            match self.inner.call(method, params) {
                Ok(payload) => return Ok(payload),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if retry >= self.policy.max_retries => {
                    log::warn!("{} failed after {} attempts: {}", method, retry + 1, e);
                    return Err(TransportError::RetriesExhausted {
                        attempts: retry + 1,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.policy.backoff(retry);
                    log::warn!(
                        "{} failed (attempt {}): {}, retrying in {:?}",
                        method,
                        retry + 1,
                        e,
                        delay
                    );
                    thread::sleep(delay);
                    retry += 1;
                }
            }
        }
    }
}

/// Reads durations given as whole milliseconds in configuration files
mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
