//! Step interpreters
//!
//! One interpreter per step kind. Interpreters return typed results and
//! never decide whether a failure ends the run.

mod element_exists;
mod fill_input;
mod press_button;
mod read_value;
mod redirect;

pub use element_exists::ElementExistsInterpreter;
pub use fill_input::FillInputInterpreter;
pub use press_button::PressButtonInterpreter;
pub use read_value::ReadValueInterpreter;
pub use redirect::RedirectInterpreter;

use async_trait::async_trait;
use browser_driver::BrowserDriver;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::errors::StepError;
use crate::model::{Step, StepKind};

/// Read-only view of the run handed to an interpreter.
pub struct StepEnv<'a> {
    pub context: &'a ExecutionContext,
    pub config: &'a EngineConfig,
    interaction_sent: AtomicBool,
}

impl<'a> StepEnv<'a> {
    pub fn new(context: &'a ExecutionContext, config: &'a EngineConfig) -> Self {
        Self {
            context,
            config,
            interaction_sent: AtomicBool::new(false),
        }
    }

    /// Record that the page received a click or keystroke with side effects.
    /// Failures after this point are not retried.
    pub fn mark_interaction_sent(&self) {
        self.interaction_sent.store(true, Ordering::Release);
    }

    pub fn interaction_sent(&self) -> bool {
        self.interaction_sent.load(Ordering::Acquire)
    }

    pub fn element_timeout(&self, step: &Step) -> Duration {
        step.wait_for_element_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.element_timeout())
    }

    pub fn navigation_timeout(&self, step: &Step) -> Duration {
        step.wait_for_navigation_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.navigation_timeout())
    }
}

/// Result of a successful step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutcome {
    /// The step caused (and waited for) a page navigation
    pub navigated: bool,
    /// Value produced by the step, stored per its capture directive
    pub captured: Option<String>,
    pub elapsed: Duration,
}

#[async_trait]
pub trait StepInterpreter: Send + Sync {
    async fn execute(
        &self,
        step: &Step,
        env: &StepEnv<'_>,
        driver: &dyn BrowserDriver,
    ) -> Result<StepOutcome, StepError>;
}

pub fn interpreter_for(kind: StepKind) -> &'static dyn StepInterpreter {
    match kind {
        StepKind::PressButton => &PressButtonInterpreter,
        StepKind::FillInput => &FillInputInterpreter,
        StepKind::Redirect => &RedirectInterpreter,
        StepKind::ReadValue => &ReadValueInterpreter,
        StepKind::ElementExists => &ElementExistsInterpreter,
    }
}

/// Final result of a step after its retry policy was applied.
#[derive(Debug)]
pub struct StepAttempt {
    pub result: Result<StepOutcome, StepError>,
    pub attempts: u32,
}

/// Run a step, retrying retryable failures with exponential backoff.
///
/// A step whose click or Enter already reached the page is never replayed,
/// so a slow navigation after a submit cannot submit twice.
pub async fn execute_step(step: &Step, env: &StepEnv<'_>, driver: &dyn BrowserDriver) -> StepAttempt {
    let policy = step.retry.unwrap_or(env.config.default_retry);
    let interpreter = interpreter_for(step.kind);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match interpreter.execute(step, env, driver).await {
            Err(err) if err.is_retryable() && env.interaction_sent() => {
                debug!(
                    kind = step.kind.as_str(),
                    attempt,
                    error = %err,
                    "Interaction already sent, not retrying"
                );
                return StepAttempt {
                    result: Err(err),
                    attempts: attempt,
                };
            }
            Err(err) if err.is_retryable() && policy.should_retry(attempt) => {
                let delay = policy.backoff(attempt);
                warn!(
                    kind = step.kind.as_str(),
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Step failed, retrying"
                );
                sleep(delay).await;
            }
            result => {
                return StepAttempt {
                    result,
                    attempts: attempt,
                }
            }
        }
    }
}

/// Selector of an element step; validated jobs always carry one.
fn target_of(step: &Step) -> Result<&str, StepError> {
    step.target
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            StepError::InvalidStep(format!("{} step has no target", step.kind.as_str()))
        })
}

/// Wait for the navigation a click or keystroke triggered, when requested.
async fn settle_navigation(
    step: &Step,
    env: &StepEnv<'_>,
    driver: &dyn BrowserDriver,
) -> Result<bool, StepError> {
    if !step.wait_for_navigation {
        return Ok(false);
    }
    driver
        .wait_for_navigation(env.navigation_timeout(step))
        .await?;
    Ok(true)
}
