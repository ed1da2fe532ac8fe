use std::{future::Future, time::Duration};

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{FetchError, StreamError, StreamResult};

/// Bounded retry with exponential backoff for requests against the playlist server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` disables retrying.
    pub retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            retries,
            base_delay,
            max_delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay before retry number `attempt + 1`, doubling each time up to `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs `operation` until it succeeds, the retries are used up or `cancel` fires.
    ///
    /// Both the request and the backoff sleep are abandoned as soon as the token is
    /// cancelled, in which case [StreamError::Cancelled] is returned.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        url: &Url,
        mut operation: F,
    ) -> StreamResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0;
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StreamError::Cancelled),
                result = operation() => result,
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if attempt >= self.retries {
                return Err(StreamError::RetriesExhausted {
                    url: url.clone(),
                    attempts: attempt + 1,
                    source: error,
                });
            }

            let delay = self.delay_for_attempt(attempt);
            attempt += 1;
            tracing::warn!("Fetching {url} failed, retry {attempt} in {delay:?}. {error}");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StreamError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(10))
    }
}
