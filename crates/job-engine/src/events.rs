//! Progress events published while a run executes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use webjob_core_types::RunId;

use crate::record::{RecordEntry, RunFailure, RunOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub executed: u64,
    /// Static instruction count; loops can push `executed` past it
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum RunEvent {
    #[serde(rename_all = "camelCase")]
    RunStarted {
        run_id: RunId,
        job_name: String,
        total_instructions: usize,
        started_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    InstructionFinished {
        run_id: RunId,
        entry: RecordEntry,
        progress: Progress,
    },
    #[serde(rename_all = "camelCase")]
    RunFinished {
        run_id: RunId,
        outcome: RunOutcome,
        entries: usize,
        failure: Option<RunFailure>,
    },
}

impl RunEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            RunEvent::RunStarted { run_id, .. }
            | RunEvent::InstructionFinished { run_id, .. }
            | RunEvent::RunFinished { run_id, .. } => run_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::RunFinished { .. })
    }
}
