//! Redirect step - load a URL and wait for the page to settle

use async_trait::async_trait;
use browser_driver::BrowserDriver;
use std::time::Instant;
use tracing::info;

use super::{StepEnv, StepInterpreter, StepOutcome};
use crate::errors::StepError;
use crate::model::Step;

pub struct RedirectInterpreter;

#[async_trait]
impl StepInterpreter for RedirectInterpreter {
    async fn execute(
        &self,
        step: &Step,
        env: &StepEnv<'_>,
        driver: &dyn BrowserDriver,
    ) -> Result<StepOutcome, StepError> {
        let started = Instant::now();

        let url = match (step.url.as_deref(), &step.value_query) {
            (Some(url), _) if !url.trim().is_empty() => url.to_string(),
            (_, Some(query)) => env.context.resolve(query)?,
            _ => {
                return Err(StepError::InvalidStep(
                    "redirect step has neither url nor valueQuery".to_string(),
                ))
            }
        };
        let timeout = env.navigation_timeout(step);

        info!(
            url = %url,
            timeout_ms = timeout.as_millis() as u64,
            "Executing redirect step"
        );

        // Navigation is always awaited; the step completes once the page has loaded.
        driver.navigate(&url, timeout).await?;

        Ok(StepOutcome {
            navigated: true,
            captured: None,
            elapsed: started.elapsed(),
        })
    }
}
