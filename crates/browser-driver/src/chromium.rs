//! `BrowserDriver` implementation over chromiumoxide.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use dashmap::DashMap;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use webjob_core_types::{ElementId, SessionId};

use crate::config::DriverConfig;
use crate::driver::{BrowserDriver, ElementHandle, SessionProvider};
use crate::error::DriverError;

const CLEAR_VALUE_FN: &str =
    "function() { if ('value' in this) { this.value = ''; this.dispatchEvent(new Event('input', { bubbles: true })); } }";

/// One browser process with a single page, owned by one run.
pub struct ChromiumDriver {
    session: SessionId,
    browser: Mutex<Option<Browser>>,
    page: Page,
    elements: DashMap<ElementId, Arc<Element>>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    poll_interval: Duration,
}

impl ChromiumDriver {
    /// Launch a browser and open a blank page.
    pub async fn launch(config: &DriverConfig) -> Result<Self, DriverError> {
        let browser_config = build_browser_config(config)?;
        let launch_timeout = Duration::from_millis(config.launch_timeout_ms);

        let (mut browser, mut handler) = timeout(launch_timeout, Browser::launch(browser_config))
            .await
            .map_err(|_| {
                DriverError::Initialization(format!(
                    "browser did not start within {}ms",
                    config.launch_timeout_ms
                ))
            })?
            .map_err(|err| DriverError::Initialization(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(?err, "browser handler reported an error");
                }
            }
            debug!("browser handler loop exited");
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(err) => {
                let _ = browser.close().await;
                handler_task.abort();
                return Err(DriverError::Initialization(format!(
                    "failed to open page: {err}"
                )));
            }
        };

        let session = SessionId::new();
        info!(session = %session, headless = config.headless, "Chromium session started");

        Ok(Self {
            session,
            browser: Mutex::new(Some(browser)),
            page,
            elements: DashMap::new(),
            handler_task: Mutex::new(Some(handler_task)),
            closed: AtomicBool::new(false),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(10)),
        })
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DriverError::SessionClosed(format!(
                "session {} was closed",
                self.session
            )));
        }
        Ok(())
    }

    fn element(&self, handle: &ElementHandle) -> Result<Arc<Element>, DriverError> {
        self.ensure_open()?;
        self.elements
            .get(&handle.id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                DriverError::Interaction(format!(
                    "stale element handle for selector '{}'",
                    handle.selector
                ))
            })
    }

    fn interaction_error(&self, err: CdpError) -> DriverError {
        if self.closed.load(Ordering::Acquire) || is_session_loss(&err) {
            DriverError::SessionClosed(err.to_string())
        } else {
            DriverError::Interaction(err.to_string())
        }
    }
}

fn build_browser_config(config: &DriverConfig) -> Result<BrowserConfig, DriverError> {
    let mut builder = BrowserConfig::builder()
        .request_timeout(Duration::from_millis(config.request_timeout_ms))
        .launch_timeout(Duration::from_millis(config.launch_timeout_ms));

    if !config.headless {
        builder = builder.with_head();
    }
    if config.no_sandbox {
        builder = builder.no_sandbox();
    }
    if let Some(path) = &config.executable {
        builder = builder.chrome_executable(path);
    }
    if let Some(dir) = &config.user_data_dir {
        builder = builder.user_data_dir(dir);
    }
    if let Some((width, height)) = config.window_size {
        builder = builder.window_size(width, height);
    }

    builder.build().map_err(DriverError::Initialization)
}

/// Pause before the next locate attempt, clamped so polling never runs past
/// `deadline`. `None` once the deadline is spent.
fn next_poll(deadline: Duration, elapsed: Duration, poll_interval: Duration) -> Option<Duration> {
    let remaining = deadline.checked_sub(elapsed).filter(|left| !left.is_zero())?;
    Some(poll_interval.min(remaining))
}

fn is_session_loss(err: &CdpError) -> bool {
    matches!(
        err,
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse
    )
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn navigate(&self, url: &str, deadline: Duration) -> Result<(), DriverError> {
        self.ensure_open()?;
        debug!(session = %self.session, url = %url, "navigating");
        match timeout(deadline, self.page.goto(url)).await {
            Err(_) => Err(DriverError::NavigationTimeout {
                target: url.to_string(),
                timeout_ms: deadline.as_millis() as u64,
            }),
            Ok(Err(err)) if self.closed.load(Ordering::Acquire) || is_session_loss(&err) => {
                Err(DriverError::SessionClosed(err.to_string()))
            }
            Ok(Err(err)) => Err(DriverError::Navigation(format!("{url}: {err}"))),
            Ok(Ok(_)) => {
                // Handles from the previous document are dead after a load.
                self.elements.clear();
                Ok(())
            }
        }
    }

    async fn locate(
        &self,
        selector: &str,
        deadline: Duration,
    ) -> Result<ElementHandle, DriverError> {
        let started = Instant::now();
        loop {
            self.ensure_open()?;
            let remaining = deadline.saturating_sub(started.elapsed());
            match timeout(remaining, self.page.find_element(selector)).await {
                Ok(Ok(element)) => {
                    let id = ElementId::new();
                    self.elements.insert(id.clone(), Arc::new(element));
                    return Ok(ElementHandle::new(id, selector));
                }
                Ok(Err(err)) if is_session_loss(&err) => {
                    return Err(DriverError::SessionClosed(err.to_string()));
                }
                Ok(Err(err)) => {
                    debug!(selector = %selector, %err, "element not yet present");
                }
                Err(_) => {}
            }

            match next_poll(deadline, started.elapsed(), self.poll_interval) {
                Some(pause) => sleep(pause).await,
                None => {
                    return Err(DriverError::NotFound {
                        selector: selector.to_string(),
                        timeout_ms: deadline.as_millis() as u64,
                    })
                }
            }
        }
    }

    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<(), DriverError> {
        let target = self.element(element)?;
        target
            .call_js_fn(CLEAR_VALUE_FN, false)
            .await
            .map_err(|err| self.interaction_error(err))?;
        target
            .focus()
            .await
            .map_err(|err| self.interaction_error(err))?;
        target
            .type_str(value)
            .await
            .map_err(|err| self.interaction_error(err))?;
        Ok(())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let target = self.element(element)?;
        target
            .click()
            .await
            .map_err(|err| self.interaction_error(err))?;
        Ok(())
    }

    async fn read_value(&self, element: &ElementHandle) -> Result<String, DriverError> {
        let target = self.element(element)?;
        let value = target
            .property("value")
            .await
            .map_err(|err| self.interaction_error(err))?;
        match value {
            Some(Value::String(text)) => Ok(text),
            Some(Value::Null) | None => Ok(target
                .inner_text()
                .await
                .map_err(|err| self.interaction_error(err))?
                .unwrap_or_default()),
            Some(other) => Ok(other.to_string()),
        }
    }

    async fn press_enter(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let target = self.element(element)?;
        target
            .press_key("Enter")
            .await
            .map_err(|err| self.interaction_error(err))?;
        Ok(())
    }

    async fn wait_for_navigation(&self, deadline: Duration) -> Result<(), DriverError> {
        self.ensure_open()?;
        match timeout(deadline, self.page.wait_for_navigation()).await {
            Err(_) => Err(DriverError::NavigationTimeout {
                target: "pending navigation".to_string(),
                timeout_ms: deadline.as_millis() as u64,
            }),
            Ok(Err(err)) if self.closed.load(Ordering::Acquire) || is_session_loss(&err) => {
                Err(DriverError::SessionClosed(err.to_string()))
            }
            Ok(Err(err)) => Err(DriverError::Navigation(err.to_string())),
            Ok(Ok(_)) => {
                self.elements.clear();
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<(), DriverError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.elements.clear();

        if let Some(mut browser) = self.browser.lock().await.take() {
            if let Err(err) = browser.close().await {
                warn!(session = %self.session, %err, "browser close command failed");
            }
            if let Err(err) = browser.wait().await {
                warn!(session = %self.session, %err, "browser process did not exit cleanly");
            }
        }
        if let Some(task) = self.handler_task.lock().await.take() {
            task.abort();
        }
        info!(session = %self.session, "Chromium session closed");
        Ok(())
    }
}

/// Launches a fresh [`ChromiumDriver`] for every run.
pub struct ChromiumLauncher {
    config: DriverConfig,
}

impl ChromiumLauncher {
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }
}

#[async_trait]
impl SessionProvider for ChromiumLauncher {
    async fn open_session(&self) -> Result<(SessionId, Arc<dyn BrowserDriver>), DriverError> {
        if self.config.executable.is_none() {
            return Err(DriverError::Initialization(
                "no Chrome/Chromium executable found; set WEBJOB_CHROME".to_string(),
            ));
        }
        let driver = ChromiumDriver::launch(&self.config).await?;
        let session = driver.session().clone();
        Ok((session, Arc::new(driver)))
    }
}
