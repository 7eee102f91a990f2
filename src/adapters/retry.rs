//! Retry Policy
//!
//! Transport-level retry with exponential backoff and full jitter, applied
//! uniformly underneath every outbound Google API call.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

/// Retry/backoff parameters for outbound HTTP calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 disables retrying)
    pub max_retries: u32,

    /// HTTP statuses that trigger a retry
    pub retry_statuses: BTreeSet<u16>,

    /// Base delay that is doubled per attempt
    pub jitter_base: Duration,

    /// Upper bound of any single delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_statuses: BTreeSet::from([503]),
            jitter_base: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(
        max_retries: u32,
        retry_statuses: impl IntoIterator<Item = u16>,
        jitter_base: Duration,
        max_backoff: Duration,
    ) -> Self {
        Self {
            max_retries,
            retry_statuses: retry_statuses.into_iter().collect(),
            jitter_base,
            max_backoff,
        }
    }

    /// Whether a response with `status` after `attempt` retries gets another try.
    pub fn should_retry(&self, status: u16, attempt: u32) -> bool {
        attempt < self.max_retries && self.retry_statuses.contains(&status)
    }

    /// Exclusive upper bound of the delay before retry number `attempt` (0-based).
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.jitter_base
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Random delay in `[0, backoff_ceiling(attempt))`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        if ceiling.is_zero() {
            return Duration::ZERO;
        }
        let nanos = rand::thread_rng().gen_range(0..ceiling.as_nanos());
        Duration::from_nanos(nanos as u64)
    }

    /// Run `op` until it yields a status outside the retry set or the budget
    /// is spent. `status_of` extracts the HTTP status of an outcome, if any.
    pub async fn execute<F, Fut, T, S>(&self, mut op: F, status_of: S) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = T>,
        S: Fn(&T) -> Option<u16>,
    {
        let mut attempt = 0;

        loop {
            let outcome = op().await;

            match status_of(&outcome) {
                Some(status) if self.should_retry(status, attempt) => {
                    let delay = self.delay_for(attempt);
                    debug!(
                        status,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying Google API request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                _ => return outcome,
            }
        }
    }
}
