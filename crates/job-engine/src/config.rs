//! Engine-wide defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retry::RetryPolicy;

pub const DEFAULT_ELEMENT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_STEPS: u64 = 10_000;
pub const DEFAULT_MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Used when a step leaves `waitForElementTimeoutMs` unset
    pub element_timeout_ms: u64,
    /// Used when a step leaves `waitForNavigationTimeoutMs` unset, and for the start URL
    pub navigation_timeout_ms: u64,
    /// Maximum instructions executed per run
    pub max_steps: u64,
    /// Maximum nesting of branches and predicates
    pub max_depth: usize,
    /// Applied to steps without their own `retry`
    pub default_retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            element_timeout_ms: DEFAULT_ELEMENT_TIMEOUT_MS,
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            max_steps: DEFAULT_MAX_STEPS,
            max_depth: DEFAULT_MAX_DEPTH,
            default_retry: RetryPolicy::NONE,
        }
    }
}

impl EngineConfig {
    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_element_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.element_timeout_ms = timeout_ms;
        self
    }

    pub fn with_navigation_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.navigation_timeout_ms = timeout_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{ "max_steps": 50 }"#).unwrap();
        assert_eq!(cfg.max_steps, 50);
        assert_eq!(cfg.element_timeout_ms, DEFAULT_ELEMENT_TIMEOUT_MS);
        assert_eq!(cfg.default_retry, RetryPolicy::NONE);
    }
}
