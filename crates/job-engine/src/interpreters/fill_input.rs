//! Fill input step - type a resolved value, optionally submit with Enter

use async_trait::async_trait;
use browser_driver::BrowserDriver;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

use super::{settle_navigation, target_of, StepEnv, StepInterpreter, StepOutcome};
use crate::errors::StepError;
use crate::model::Step;

pub struct FillInputInterpreter;

#[async_trait]
impl StepInterpreter for FillInputInterpreter {
    async fn execute(
        &self,
        step: &Step,
        env: &StepEnv<'_>,
        driver: &dyn BrowserDriver,
    ) -> Result<StepOutcome, StepError> {
        let started = Instant::now();
        let selector = target_of(step)?;

        // Resolve before touching the page so a missing value leaves it untouched.
        let value = match &step.value_query {
            Some(query) => env.context.resolve(query)?,
            None => {
                return Err(StepError::InvalidStep(
                    "fillInput step has no valueQuery".to_string(),
                ))
            }
        };

        info!(
            selector = %selector,
            value_length = value.len(),
            press_enter = step.press_enter_after_fill,
            "Executing fillInput step"
        );

        let handle = driver.locate(selector, env.element_timeout(step)).await?;
        driver.fill(&handle, &value).await?;

        if step.press_enter_after_fill {
            if step.delay_before_enter_ms > 0 {
                debug!(delay_ms = step.delay_before_enter_ms, "Waiting before Enter");
                sleep(Duration::from_millis(step.delay_before_enter_ms)).await;
            }
            driver.press_enter(&handle).await?;
            env.mark_interaction_sent();
        }

        let navigated = settle_navigation(step, env, driver).await?;

        Ok(StepOutcome {
            navigated,
            captured: None,
            elapsed: started.elapsed(),
        })
    }
}
