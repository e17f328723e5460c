//! Per-run execution context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::StepError;
use crate::model::{Capture, CaptureScope, ValueQuery};
use crate::record::RunOutcome;

/// One captured value. Unnamed values are addressable by index only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub value: String,
}

/// Append-only log of captured values, in capture order.
///
/// Capturing a name twice keeps both entries; lookups by name see the most
/// recent one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReturnValues {
    entries: Vec<ReturnValue>,
}

impl ReturnValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value and return its index.
    pub fn push(&mut self, name: Option<String>, value: impl Into<String>) -> usize {
        self.entries.push(ReturnValue {
            name,
            value: value.into(),
        });
        self.entries.len() - 1
    }

    pub fn get_named(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.name.as_deref() == Some(name))
            .map(|entry| entry.value.as_str())
    }

    pub fn get_index(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|entry| entry.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReturnValue> {
        self.entries.iter()
    }
}

/// Mutable state of a single run, owned by the run supervisor.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    return_values: ReturnValues,
    locals: HashMap<String, String>,
    steps_executed: u64,
    previous_step_succeeded: bool,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    outcome: Option<RunOutcome>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::seeded(ReturnValues::new())
    }

    /// Start a run with values carried over from elsewhere.
    pub fn seeded(return_values: ReturnValues) -> Self {
        Self {
            return_values,
            locals: HashMap::new(),
            steps_executed: 0,
            previous_step_succeeded: true,
            started_at: Utc::now(),
            finished_at: None,
            outcome: None,
        }
    }

    pub fn return_values(&self) -> &ReturnValues {
        &self.return_values
    }

    pub fn local(&self, name: &str) -> Option<&str> {
        self.locals.get(name).map(String::as_str)
    }

    pub fn steps_executed(&self) -> u64 {
        self.steps_executed
    }

    pub fn previous_step_succeeded(&self) -> bool {
        self.previous_step_succeeded
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn outcome(&self) -> Option<RunOutcome> {
        self.outcome
    }

    /// Value a query refers to, if any.
    pub fn lookup<'a>(&'a self, query: &'a ValueQuery) -> Option<&'a str> {
        match query {
            ValueQuery::Literal(value) => Some(value.as_str()),
            ValueQuery::ReturnValue(name) => self.return_values.get_named(name),
            ValueQuery::ReturnIndex(index) => self.return_values.get_index(*index),
            ValueQuery::Variable(name) => self.local(name),
        }
    }

    /// Like `lookup`, but missing data is a step failure.
    pub fn resolve(&self, query: &ValueQuery) -> Result<String, StepError> {
        self.lookup(query)
            .map(str::to_string)
            .ok_or_else(|| StepError::DataResolution(describe_missing(query)))
    }

    /// Store a step output according to its capture directive.
    pub fn capture(&mut self, capture: &Capture, value: String) {
        match capture {
            Capture {
                name: Some(name),
                scope: CaptureScope::Local,
            } => {
                self.locals.insert(name.clone(), value);
            }
            Capture { name, .. } => {
                self.return_values.push(name.clone(), value);
            }
        }
    }

    pub fn set_local(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.locals.insert(name.into(), value.into());
    }

    /// Drop all scratch variables; done when a loop re-enters earlier instructions.
    pub fn clear_locals(&mut self) {
        self.locals.clear();
    }

    pub(crate) fn record_step_result(&mut self, succeeded: bool) {
        self.previous_step_succeeded = succeeded;
    }

    pub(crate) fn count_instruction(&mut self) {
        self.steps_executed += 1;
    }

    pub(crate) fn finish(&mut self, outcome: RunOutcome) {
        if self.outcome.is_none() {
            self.finished_at = Some(Utc::now());
            self.outcome = Some(outcome);
        }
    }
}

fn describe_missing(query: &ValueQuery) -> String {
    match query {
        ValueQuery::Literal(_) => "literal value unavailable".to_string(),
        ValueQuery::ReturnValue(name) => format!("no return value named '{name}'"),
        ValueQuery::ReturnIndex(index) => format!("no return value at index {index}"),
        ValueQuery::Variable(name) => format!("no local variable '{name}'"),
    }
}
