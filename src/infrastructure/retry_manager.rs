//! Retry policies shared by the fetch and download paths
//!
//! Catalog fetches back off exponentially (`base * 2^attempt`); poster
//! downloads back off linearly (`step * (attempt + 1)`). Attempts are
//! zero-based and no delay follows the final attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Largest exponent applied to the base delay
const MAX_BACKOFF_EXPONENT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Exponential,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff: Backoff::Exponential,
        }
    }

    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: step,
            backoff: Backoff::Linear,
        }
    }

    /// Delay to wait after the zero-based `attempt` failed
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Exponential => {
                let factor = 1u32 << attempt.min(MAX_BACKOFF_EXPONENT);
                self.base_delay.saturating_mul(factor)
            }
            Backoff::Linear => self.base_delay.saturating_mul(attempt.saturating_add(1)),
        }
    }

    /// Runs `op` until it succeeds or `max_attempts` is reached.
    pub async fn run<T, E, F, Fut>(&self, label: &str, op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_while(label, |_| true, op).await
    }

    /// Like `run`, but gives up early when `should_retry` rejects an error.
    pub async fn run_while<T, E, P, F, Fut>(&self, label: &str, should_retry: P, mut op: F) -> Result<T, E>
    where
        E: Display,
        P: Fn(&E) -> bool,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("{label} succeeded on attempt {}", attempt + 1);
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let last = attempt + 1 >= self.max_attempts;
                    if last || !should_retry(&err) {
                        warn!("{label} failed after {} attempt(s): {err}", attempt + 1);
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{label} attempt {}/{} failed: {err}; retrying in {}ms",
                        attempt + 1,
                        self.max_attempts,
                        delay.as_millis()
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
