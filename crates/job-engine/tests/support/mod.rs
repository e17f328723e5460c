//! Scripted in-memory browser used by the engine integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use browser_driver::{BrowserDriver, DriverError, ElementHandle, SessionProvider};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use webjob_core_types::{ElementId, SessionId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Navigate(String),
    Locate(String),
    Fill(String, String),
    Click(String),
    ReadValue(String),
    PressEnter(String),
    WaitForNavigation,
    Close,
}

#[derive(Default)]
struct Script {
    elements: HashMap<String, String>,
    page_delays: HashMap<String, Duration>,
    broken_urls: HashMap<String, DriverError>,
    flaky_clicks: HashMap<String, u32>,
    cancel_after_clicks: Option<(usize, CancellationToken)>,
    close_after_clicks: Option<usize>,
    stalled_navigation: bool,
    clicks: usize,
    closed: bool,
    calls: Vec<(Instant, Call)>,
}

/// Page with a fixed set of elements and scripted navigation behavior.
#[derive(Default)]
pub struct ScriptedDriver {
    script: Mutex<Script>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(self, selector: &str, value: &str) -> Self {
        self.edit(|s| {
            s.elements.insert(selector.to_string(), value.to_string());
        })
    }

    /// Loading `url` takes `delay`.
    pub fn with_page_delay(self, url: &str, delay: Duration) -> Self {
        self.edit(|s| {
            s.page_delays.insert(url.to_string(), delay);
        })
    }

    pub fn with_broken_url(self, url: &str, err: DriverError) -> Self {
        self.edit(|s| {
            s.broken_urls.insert(url.to_string(), err);
        })
    }

    /// The first `failures` clicks on `selector` fail with an interaction error.
    pub fn with_flaky_click(self, selector: &str, failures: u32) -> Self {
        self.edit(|s| {
            s.flaky_clicks.insert(selector.to_string(), failures);
        })
    }

    pub fn cancel_after_clicks(self, clicks: usize, token: CancellationToken) -> Self {
        self.edit(|s| s.cancel_after_clicks = Some((clicks, token)))
    }

    /// Simulate the browser going away after `clicks` successful clicks.
    pub fn close_after_clicks(self, clicks: usize) -> Self {
        self.edit(|s| s.close_after_clicks = Some(clicks))
    }

    /// Clicks and keystrokes never trigger a navigation.
    pub fn with_stalled_navigation(self) -> Self {
        self.edit(|s| s.stalled_navigation = true)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn timed_calls(&self) -> Vec<(Instant, Call)> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn clicked(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Click(selector) => Some(selector),
                _ => None,
            })
            .collect()
    }

    fn edit(self, f: impl FnOnce(&mut Script)) -> Self {
        f(&mut self.script.lock().unwrap());
        self
    }

    fn record(&self, call: Call) -> Result<(), DriverError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push((Instant::now(), call));
        if script.closed {
            return Err(DriverError::SessionClosed("browser closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), DriverError> {
        self.record(Call::Navigate(url.to_string()))?;
        let (broken, delay) = {
            let script = self.script.lock().unwrap();
            (
                script.broken_urls.get(url).cloned(),
                script.page_delays.get(url).copied().unwrap_or_default(),
            )
        };
        if let Some(err) = broken {
            return Err(err);
        }
        if delay > timeout {
            sleep(timeout).await;
            return Err(DriverError::NavigationTimeout {
                target: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        sleep(delay).await;
        Ok(())
    }

    async fn locate(&self, selector: &str, timeout: Duration) -> Result<ElementHandle, DriverError> {
        self.record(Call::Locate(selector.to_string()))?;
        let present = self.script.lock().unwrap().elements.contains_key(selector);
        if present {
            return Ok(ElementHandle::new(ElementId(selector.to_string()), selector));
        }
        sleep(timeout).await;
        Err(DriverError::NotFound {
            selector: selector.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<(), DriverError> {
        self.record(Call::Fill(element.selector.clone(), value.to_string()))?;
        self.script
            .lock()
            .unwrap()
            .elements
            .insert(element.selector.clone(), value.to_string());
        Ok(())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.record(Call::Click(element.selector.clone()))?;
        let mut script = self.script.lock().unwrap();

        if let Some(remaining) = script.flaky_clicks.get_mut(&element.selector) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DriverError::Interaction("element is detached".to_string()));
            }
        }

        script.clicks += 1;
        let clicks = script.clicks;
        if let Some((after, token)) = &script.cancel_after_clicks {
            if clicks >= *after {
                token.cancel();
            }
        }
        if script.close_after_clicks.map(|n| clicks >= n).unwrap_or(false) {
            script.closed = true;
        }
        Ok(())
    }

    async fn read_value(&self, element: &ElementHandle) -> Result<String, DriverError> {
        self.record(Call::ReadValue(element.selector.clone()))?;
        self.script
            .lock()
            .unwrap()
            .elements
            .get(&element.selector)
            .cloned()
            .ok_or_else(|| DriverError::Interaction("element is detached".to_string()))
    }

    async fn press_enter(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.record(Call::PressEnter(element.selector.clone()))
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> Result<(), DriverError> {
        self.record(Call::WaitForNavigation)?;
        if self.script.lock().unwrap().stalled_navigation {
            sleep(timeout).await;
            return Err(DriverError::NavigationTimeout {
                target: "pending navigation".to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push((Instant::now(), Call::Close));
        script.closed = true;
        Ok(())
    }
}

/// Provider handing out one shared scripted driver.
pub struct ScriptedProvider(pub Arc<ScriptedDriver>);

#[async_trait]
impl SessionProvider for ScriptedProvider {
    async fn open_session(&self) -> Result<(SessionId, Arc<dyn BrowserDriver>), DriverError> {
        let driver: Arc<dyn BrowserDriver> = self.0.clone();
        Ok((SessionId::new(), driver))
    }
}

/// Provider whose browser never starts.
pub struct BrokenProvider;

#[async_trait]
impl SessionProvider for BrokenProvider {
    async fn open_session(&self) -> Result<(SessionId, Arc<dyn BrowserDriver>), DriverError> {
        Err(DriverError::Initialization("chrome not found".to_string()))
    }
}
