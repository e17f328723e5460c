//! Browser driver capability for the webjob engine.
//!
//! The engine talks to a live page only through [`BrowserDriver`]. Every
//! operation takes an explicit timeout where waiting is involved and returns a
//! typed [`DriverError`]; the driver never retries on its own. Losing the
//! underlying browser session surfaces as [`DriverError::SessionClosed`].

pub mod chromium;
pub mod config;
pub mod driver;
pub mod error;

pub use chromium::{ChromiumDriver, ChromiumLauncher};
pub use config::DriverConfig;
pub use driver::{BrowserDriver, ElementHandle, SessionProvider};
pub use error::DriverError;
