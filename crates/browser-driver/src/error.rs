//! Driver error taxonomy.

use thiserror::Error;

/// Failures surfaced by a [`crate::BrowserDriver`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Navigation did not settle before its deadline
    #[error("navigation to {target} timed out after {timeout_ms}ms")]
    NavigationTimeout { target: String, timeout_ms: u64 },

    /// Navigation was rejected or the page failed to load
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// No element matched the selector before the deadline
    #[error("element '{selector}' not found within {timeout_ms}ms")]
    NotFound { selector: String, timeout_ms: u64 },

    /// Element exists but the interaction failed (detached, not interactable, ...)
    #[error("interaction failed: {0}")]
    Interaction(String),

    /// The browser session is gone; nothing further can run on it
    #[error("browser session closed: {0}")]
    SessionClosed(String),

    /// The browser could not be started
    #[error("driver initialization failed: {0}")]
    Initialization(String),

    #[error("internal driver error: {0}")]
    Internal(String),
}

impl DriverError {
    /// Whether the session is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DriverError::SessionClosed(_) | DriverError::Initialization(_)
        )
    }

    /// Stable machine-readable code for logs and records.
    pub fn code(&self) -> &'static str {
        match self {
            DriverError::NavigationTimeout { .. } => "navigation_timeout",
            DriverError::Navigation(_) => "navigation",
            DriverError::NotFound { .. } => "element_not_found",
            DriverError::Interaction(_) => "interaction",
            DriverError::SessionClosed(_) => "session_closed",
            DriverError::Initialization(_) => "driver_initialization",
            DriverError::Internal(_) => "driver_internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_session_level_errors_are_fatal() {
        assert!(DriverError::SessionClosed("gone".into()).is_fatal());
        assert!(DriverError::Initialization("no chrome".into()).is_fatal());
        assert!(!DriverError::NotFound {
            selector: "#a".into(),
            timeout_ms: 10
        }
        .is_fatal());
        assert!(!DriverError::NavigationTimeout {
            target: "https://example.com".into(),
            timeout_ms: 10
        }
        .is_fatal());
    }

    #[test]
    fn messages_carry_context() {
        let err = DriverError::NotFound {
            selector: "#submit".into(),
            timeout_ms: 250,
        };
        assert_eq!(err.to_string(), "element '#submit' not found within 250ms");
        assert_eq!(err.code(), "element_not_found");
    }
}
