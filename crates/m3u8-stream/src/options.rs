use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::retry::RetryPolicy;

/// Tunables of a stream. Every field has a default, so a partial
/// configuration file deserializes fine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    /// Retries of a failed playlist or segment request.
    pub retries: u32,
    /// Delay before the first retry in milliseconds, doubled on each further retry.
    pub retry_backoff_ms: u64,
    pub max_retry_backoff_ms: u64,
    /// Seconds used instead of the target duration while the playlist does not declare one.
    pub default_target_duration: u64,
    /// Size of the chunks requested by the `AsyncRead` adapter.
    pub read_chunk_size: usize,
}

impl StreamOptions {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retries,
            Duration::from_millis(self.retry_backoff_ms),
            Duration::from_millis(self.max_retry_backoff_ms),
        )
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_backoff_ms: 500,
            max_retry_backoff_ms: 10_000,
            default_target_duration: 100,
            read_chunk_size: 64 * 1024,
        }
    }
}
