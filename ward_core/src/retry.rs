use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{ConflictError, EngineError};
use crate::store::StoreError;

/// Bounded exponential backoff for optimistic writes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 2,
            max_delay_ms: 64,
        }
    }
}

impl RetryPolicy {
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Retry `op` on version conflicts and transient outages. Only for
    /// operations that re-read their inputs and are safe to repeat.
    pub fn run<T, F>(&self, label: &'static str, op: F) -> Result<T, EngineError>
    where
        F: FnMut(u32) -> Result<T, EngineError>,
    {
        self.run_while(label, StoreError::is_retryable, op)
    }

    /// Retry `op` on version conflicts only.
    pub fn run_on_conflict<T, F>(&self, label: &'static str, op: F) -> Result<T, EngineError>
    where
        F: FnMut(u32) -> Result<T, EngineError>,
    {
        self.run_while(label, StoreError::is_conflict, op)
    }

    fn run_while<T, F>(
        &self,
        label: &'static str,
        retryable: fn(&StoreError) -> bool,
        mut op: F,
    ) -> Result<T, EngineError>
    where
        F: FnMut(u32) -> Result<T, EngineError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt) {
                Err(EngineError::Storage(err)) if retryable(&err) => {
                    if attempt >= max_attempts {
                        return Err(match err {
                            StoreError::Conflict(record) => ConflictError::Contention {
                                record: record.to_string(),
                                attempts: attempt,
                            }
                            .into(),
                            other => EngineError::Storage(other),
                        });
                    }
                    let delay = self.delay_for(attempt);
                    debug!(
                        target: "ward::retry",
                        label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retry.backoff"
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
                other => return other,
            }
        }
    }
}
