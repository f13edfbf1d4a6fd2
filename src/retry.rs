//! Bounded retry of fallible operations.

use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};

/// Re-runs an operation up to `attempts` times while a classifier reports
/// the failure as retryable.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Runs `op`, passing the 1-based attempt number.
    ///
    /// Returns the first success, the first non-retryable error, or the last
    /// error once attempts are exhausted.
    pub fn run<T, F, C>(&self, mut op: F, retryable: C) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
        C: Fn(&Error) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.attempts && retryable(&e) => {
                    log::warn!(
                        "attempt {}/{} failed: {}; retrying",
                        attempt,
                        self.attempts,
                        e
                    );
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Retries only transient failures.
    pub fn run_transient<T, F>(&self, op: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        self.run(op, Error::is_transient)
    }
}
