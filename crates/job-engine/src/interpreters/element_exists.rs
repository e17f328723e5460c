use async_trait::async_trait;
use browser_driver::{BrowserDriver, DriverError};
use std::time::Instant;
use tracing::info;

use super::{target_of, StepEnv, StepInterpreter, StepOutcome};
use crate::errors::StepError;
use crate::model::Step;

/// Records whether an element appears within the wait timeout, as `"true"`/`"false"`.
pub struct ElementExistsInterpreter;

#[async_trait]
impl StepInterpreter for ElementExistsInterpreter {
    async fn execute(
        &self,
        step: &Step,
        env: &StepEnv<'_>,
        driver: &dyn BrowserDriver,
    ) -> Result<StepOutcome, StepError> {
        let started = Instant::now();
        let selector = target_of(step)?;
        let timeout = env.element_timeout(step);

        info!(
            selector = %selector,
            timeout_ms = timeout.as_millis() as u64,
            "Executing elementExists step"
        );

        let present = match driver.locate(selector, timeout).await {
            Ok(_) => true,
            Err(DriverError::NotFound { .. }) => false,
            Err(err) => return Err(err.into()),
        };

        Ok(StepOutcome {
            navigated: false,
            captured: Some(present.to_string()),
            elapsed: started.elapsed(),
        })
    }
}
