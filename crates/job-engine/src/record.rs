//! Run records.
//!
//! A [`RunRecorder`] accumulates one entry per executed instruction and is
//! consumed by [`RunRecorder::finish`], so a record is finalized once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use webjob_core_types::RunId;

use crate::context::ReturnValues;
use crate::errors::{FlowError, StepError};
use crate::flow::FlowDecision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunOutcome {
    Completed,
    Failed,
    Cancelled,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Failed => "failed",
            RunOutcome::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedError {
    pub code: String,
    pub message: String,
    pub fatal: bool,
}

impl RecordedError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, fatal: bool) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            fatal,
        }
    }

    pub fn from_step(err: &StepError, fatal: bool) -> Self {
        Self::new(err.code(), err.to_string(), fatal)
    }

    pub fn from_flow(err: &FlowError) -> Self {
        Self::new(err.code(), err.to_string(), true)
    }
}

/// The failure that ended a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFailure {
    /// Positional address of the failing instruction; `None` before the first one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    pub error: RecordedError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEntry {
    pub sequence: u64,
    pub position: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction_id: Option<String>,
    pub kind: String,
    pub status: EntryStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub latency_ms: u64,
    pub attempts: u32,
    pub navigated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<FlowDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RecordedError>,
}

impl RecordEntry {
    pub fn succeeded(&self) -> bool {
        self.status == EntryStatus::Succeeded
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: RunId,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub latency_ms: u64,
    pub outcome: RunOutcome,
    pub total_instructions: usize,
    pub entries: Vec<RecordEntry>,
    pub return_values: ReturnValues,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
}

impl RunRecord {
    pub fn failed_entries(&self) -> usize {
        self.entries.iter().filter(|e| !e.succeeded()).count()
    }
}

/// Incremental builder for a [`RunRecord`].
#[derive(Debug)]
pub struct RunRecorder {
    run_id: RunId,
    job_name: String,
    total_instructions: usize,
    started_at: DateTime<Utc>,
    entries: Vec<RecordEntry>,
}

impl RunRecorder {
    pub fn new(run_id: RunId, job_name: impl Into<String>, total_instructions: usize) -> Self {
        Self {
            run_id,
            job_name: job_name.into(),
            total_instructions,
            started_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    pub fn next_sequence(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn append(&mut self, entry: RecordEntry) -> &RecordEntry {
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn finish(
        self,
        outcome: RunOutcome,
        failure: Option<RunFailure>,
        return_values: ReturnValues,
    ) -> RunRecord {
        let finished_at = Utc::now();
        let latency_ms = (finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
        RunRecord {
            run_id: self.run_id,
            job_name: self.job_name,
            started_at: self.started_at,
            finished_at,
            latency_ms,
            outcome,
            total_instructions: self.total_instructions,
            entries: self.entries,
            return_values,
            failure,
        }
    }
}
