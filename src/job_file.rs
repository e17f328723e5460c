//! Job definition files (JSON or YAML).

use std::path::Path;

use anyhow::{Context, Result};
use tokio::fs;
use webjob_engine::Job;

pub async fn load_job(path: &Path) -> Result<Job> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read job file {}", path.display()))?;
    parse_job(&content, path)
}

/// Parse by extension; unknown extensions are parsed as YAML, which also accepts JSON.
pub fn parse_job(content: &str, path: &Path) -> Result<Job> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("json") => serde_json::from_str(content)
            .with_context(|| format!("Failed to parse JSON job {}", path.display())),
        _ => serde_yaml::from_str(content)
            .with_context(|| format!("Failed to parse YAML job {}", path.display())),
    }
}
