//! Read value step

use async_trait::async_trait;
use browser_driver::BrowserDriver;
use std::time::Instant;
use tracing::info;

use super::{target_of, StepEnv, StepInterpreter, StepOutcome};
use crate::errors::StepError;
use crate::model::Step;

pub struct ReadValueInterpreter;

#[async_trait]
impl StepInterpreter for ReadValueInterpreter {
    async fn execute(
        &self,
        step: &Step,
        env: &StepEnv<'_>,
        driver: &dyn BrowserDriver,
    ) -> Result<StepOutcome, StepError> {
        let started = Instant::now();
        let selector = target_of(step)?;

        info!(selector = %selector, "Executing readValue step");

        let handle = driver.locate(selector, env.element_timeout(step)).await?;
        let value = driver.read_value(&handle).await?;

        Ok(StepOutcome {
            navigated: false,
            captured: Some(value),
            elapsed: started.elapsed(),
        })
    }
}
