//! Batch write retries with bounded exponential backoff.

use crate::error::{DbError, InsertionError};
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Longest pause between two attempts
pub const MAX_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, base_ms: u64) -> Self {
        Self {
            retries,
            base: Duration::from_millis(base_ms),
            cap: MAX_BACKOFF,
        }
    }

    /// Pause before retry number `retry` (1-based)
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Run `op` until it succeeds or the retries are spent.
    ///
    /// Missing tables and columns are not retried; they will not appear
    /// between attempts. `on_retry` is called before each pause.
    pub fn run<T, F, R>(
        &self,
        table: &str,
        batch: u64,
        mut op: F,
        mut on_retry: R,
    ) -> Result<T, InsertionError>
    where
        F: FnMut() -> Result<T, DbError>,
        R: FnMut(u32, &DbError),
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let permanent = matches!(
                err,
                DbError::TableNotFound(_) | DbError::ColumnNotFound { .. }
            );
            if permanent || attempt > self.retries {
                return Err(InsertionError {
                    table: table.to_string(),
                    batch,
                    attempts: attempt,
                    source: err,
                });
            }
            let pause = self.delay(attempt);
            warn!(table, batch, attempt, error = %err, "batch write failed, retrying in {:?}", pause);
            on_retry(attempt, &err);
            thread::sleep(pause);
        }
    }
}
