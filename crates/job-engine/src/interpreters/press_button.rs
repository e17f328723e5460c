//! Press button step

use async_trait::async_trait;
use browser_driver::BrowserDriver;
use std::time::Instant;
use tracing::{debug, info};

use super::{settle_navigation, target_of, StepEnv, StepInterpreter, StepOutcome};
use crate::errors::StepError;
use crate::model::Step;

pub struct PressButtonInterpreter;

#[async_trait]
impl StepInterpreter for PressButtonInterpreter {
    async fn execute(
        &self,
        step: &Step,
        env: &StepEnv<'_>,
        driver: &dyn BrowserDriver,
    ) -> Result<StepOutcome, StepError> {
        let started = Instant::now();
        let selector = target_of(step)?;

        info!(
            selector = %selector,
            wait_for_navigation = step.wait_for_navigation,
            "Executing pressButton step"
        );

        let handle = driver.locate(selector, env.element_timeout(step)).await?;
        driver.click(&handle).await?;
        env.mark_interaction_sent();
        debug!(selector = %selector, "Clicked");

        let navigated = settle_navigation(step, env, driver).await?;

        Ok(StepOutcome {
            navigated,
            captured: None,
            elapsed: started.elapsed(),
        })
    }
}
