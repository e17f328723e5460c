//! The capability surface the engine drives.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use webjob_core_types::{ElementId, SessionId};

use crate::error::DriverError;

/// Reference to an element resolved by [`BrowserDriver::locate`].
///
/// Handles are only meaningful to the driver that produced them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementHandle {
    pub id: ElementId,
    pub selector: String,
}

impl ElementHandle {
    pub fn new(id: ElementId, selector: impl Into<String>) -> Self {
        Self {
            id,
            selector: selector.into(),
        }
    }
}

/// Page operations available to step interpreters.
///
/// All calls may suspend on network or DOM readiness. Implementations must
/// not retry internally.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate the page and wait for the load to settle.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Wait until an element matching `selector` is present.
    async fn locate(&self, selector: &str, timeout: Duration)
        -> Result<ElementHandle, DriverError>;

    /// Replace the element's current value with `value`.
    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<(), DriverError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Read the element's value, falling back to its text content.
    async fn read_value(&self, element: &ElementHandle) -> Result<String, DriverError>;

    async fn press_enter(&self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Wait for an in-flight navigation triggered by a prior interaction.
    async fn wait_for_navigation(&self, timeout: Duration) -> Result<(), DriverError>;

    /// Close the session. In-flight and later calls fail with `SessionClosed`.
    async fn close(&self) -> Result<(), DriverError>;
}

/// Hands out one fresh driver session per run.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn open_session(&self) -> Result<(SessionId, Arc<dyn BrowserDriver>), DriverError>;
}
