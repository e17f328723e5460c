//! Application configuration

use std::env;
use std::path::PathBuf;

use browser_driver::DriverConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;
use webjob_engine::EngineConfig;

/// Everything the CLI reads from `config.yaml`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub driver: DriverConfig,
    pub engine: EngineConfig,
    /// Directory receiving one JSON file per finished run
    pub record_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Apply `WEBJOB_*` environment variables on top of file values.
    pub fn apply_env_overrides(&mut self) {
        self.driver.apply_env_overrides();

        if let Ok(raw) = env::var("WEBJOB_MAX_STEPS") {
            match raw.trim().parse::<u64>() {
                Ok(max_steps) if max_steps > 0 => self.engine.max_steps = max_steps,
                _ => warn!(value = %raw, "ignoring invalid WEBJOB_MAX_STEPS"),
            }
        }
        if let Ok(raw) = env::var("WEBJOB_RECORD_DIR") {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                self.record_dir = Some(PathBuf::from(trimmed));
            }
        }
    }
}
