// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reconnect backoff policy.
//!
//! Exponential backoff with ±25% jitter, capped by a maximum attempt
//! count. The jitter keeps a fleet of reconnecting workers from
//! synchronizing on the broker.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::BusError;

/// Backoff schedule for broker (re)connection.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// First retry delay.
    pub base: Duration,
    /// Delays stop growing past this.
    pub max_delay: Duration,
    /// Give up after this many attempts.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (0-based), jittered ±25%.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        exp.mul_f64(jitter)
    }

    /// Run `connect` until it succeeds or the attempt budget is spent.
    /// Each failure is logged with its attempt number and next delay.
    ///
    /// # Errors
    ///
    /// The last connection error once attempts are exhausted.
    pub async fn connect_with_retry<T, F, Fut>(&self, mut connect: F) -> Result<T, BusError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BusError>>,
    {
        let mut attempt = 0;
        loop {
            match connect().await {
                Ok(connection) => {
                    if attempt > 0 {
                        tracing::info!(attempt, "bus reconnected");
                    }
                    return Ok(connection);
                }
                Err(e) if attempt + 1 >= self.max_attempts => {
                    tracing::error!(attempt, error = %e, "bus connection attempts exhausted");
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay(attempt);
                    tracing::warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "bus connection failed; backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
