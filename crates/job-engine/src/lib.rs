//! Instruction execution engine
//!
//! Interprets a job's instruction tree (or its legacy flat, jump-addressed
//! form) against a browser driver, one instruction at a time:
//! - `model`: jobs, steps, conditions and traversal helpers
//! - `context`: per-run variables and captured return values
//! - `interpreters`: one handler per step kind, with retry policy
//! - `flow`: predicate-driven branch selection and cursor movement
//! - `supervisor`: the run loop, cancellation and failure classification

pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod flow;
pub mod interpreters;
pub mod model;
pub mod predicate;
pub mod record;
pub mod retry;
pub mod supervisor;

pub use config::EngineConfig;
pub use context::{ExecutionContext, ReturnValue, ReturnValues};
pub use errors::{FlowError, StepError, SupervisorError};
pub use events::{Progress, RunEvent};
pub use flow::{FlowController, FlowDecision, FlowState, Located, Next, Program};
pub use interpreters::{StepEnv, StepInterpreter, StepOutcome};
pub use model::{
    count_instructions, AddressingMode, AiAction, Capture, CaptureScope, Condition, FlowAction,
    Instruction, Job, Step, StepKind, ValueQuery,
};
pub use predicate::{CompareOp, Predicate};
pub use record::{EntryStatus, RecordEntry, RecordedError, RunFailure, RunOutcome, RunRecord};
pub use retry::RetryPolicy;
pub use supervisor::{FailureClass, RecordSink, RunSupervisor, SupervisorState};
