//! Record sink writing finished runs as JSON files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tracing::info;
use webjob_engine::{RecordSink, RunRecord};

pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<job>-<run id>.json`, with the job name reduced to safe characters.
    pub fn path_for(&self, record: &RunRecord) -> PathBuf {
        let job: String = record
            .job_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}-{}.json", job, record.run_id))
    }
}

#[async_trait]
impl RecordSink for JsonFileSink {
    async fn record_finished(&self, record: &RunRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.path_for(record);
        let body = serde_json::to_vec_pretty(record).context("Failed to serialize run record")?;
        fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!(run_id = %record.run_id, path = %path.display(), "Run record written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webjob_core_types::RunId;
    use webjob_engine::record::RunRecorder;
    use webjob_engine::{ReturnValues, RunOutcome};

    fn record(job: &str) -> RunRecord {
        let mut values = ReturnValues::new();
        values.push(Some("title".into()), "Hello");
        RunRecorder::new(RunId::new(), job, 0).finish(RunOutcome::Completed, None, values)
    }

    #[test]
    fn file_names_are_sanitized() {
        let sink = JsonFileSink::new("/tmp/records");
        let record = record("shop / checkout");
        let path = sink.path_for(&record);
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("shop___checkout-"));
        assert!(name.ends_with(".json"));
    }

    #[tokio::test]
    async fn writes_record_into_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("runs").join("today"));
        let record = record("login");

        sink.record_finished(&record).await.unwrap();

        let written = std::fs::read_to_string(sink.path_for(&record)).unwrap();
        let restored: RunRecord = serde_json::from_str(&written).unwrap();
        assert_eq!(restored, record);
    }
}
