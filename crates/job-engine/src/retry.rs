//! Retry policy applied by the interpreter layer.

use serde::{Deserialize, Serialize};
use tokio::time::Duration;

const MAX_BACKOFF_MS: u64 = 60_000;

/// How many times a step may be attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff_ms: u64,
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub const NONE: RetryPolicy = RetryPolicy {
        max_attempts: 1,
        backoff_ms: 0,
    };

    pub fn new(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_ms,
        }
    }

    /// Whether another attempt is allowed after `attempt` attempts.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Exponential backoff: backoff_ms * 2^(attempt-1), capped at 60 seconds.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.saturating_pow(attempt.saturating_sub(1));
        let total_ms = self.backoff_ms.saturating_mul(multiplier);
        Duration::from_millis(total_ms.min(MAX_BACKOFF_MS))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::NONE
    }
}
