//! Engine error types

use browser_driver::DriverError;
use thiserror::Error;

/// Failure of a single step, as returned by a step interpreter.
///
/// Interpreters never decide whether a failure ends the run; that is
/// `supervisor::classify`'s job.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StepError {
    /// Element lookup exceeded its wait timeout
    #[error("element '{selector}' not found within {timeout_ms}ms")]
    ElementNotFound { selector: String, timeout_ms: u64 },

    /// A value query referenced data that was never captured
    #[error("could not resolve value: {0}")]
    DataResolution(String),

    /// Element found but the interaction failed
    #[error("interaction failed: {0}")]
    Interaction(String),

    /// Navigation did not settle before its timeout
    #[error("navigation to {target} timed out after {timeout_ms}ms")]
    NavigationTimeout { target: String, timeout_ms: u64 },

    /// Navigation was rejected outright
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The browser session is gone
    #[error("browser session closed: {0}")]
    SessionClosed(String),

    /// Instruction kind is reserved but not executable
    #[error("unsupported instruction: {0}")]
    Unsupported(String),

    /// Step parameters are inconsistent with its kind
    #[error("invalid step: {0}")]
    InvalidStep(String),
}

impl StepError {
    /// Whether another attempt of the same step could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StepError::ElementNotFound { .. }
                | StepError::Interaction(_)
                | StepError::NavigationTimeout { .. }
                | StepError::Navigation(_)
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            StepError::ElementNotFound { .. } => "element_not_found",
            StepError::DataResolution(_) => "data_resolution",
            StepError::Interaction(_) => "interaction",
            StepError::NavigationTimeout { .. } => "navigation_timeout",
            StepError::Navigation(_) => "navigation",
            StepError::SessionClosed(_) => "session_closed",
            StepError::Unsupported(_) => "unsupported",
            StepError::InvalidStep(_) => "invalid_step",
        }
    }
}

impl From<DriverError> for StepError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::NotFound {
                selector,
                timeout_ms,
            } => StepError::ElementNotFound {
                selector,
                timeout_ms,
            },
            DriverError::NavigationTimeout { target, timeout_ms } => {
                StepError::NavigationTimeout { target, timeout_ms }
            }
            DriverError::Navigation(msg) => StepError::Navigation(msg),
            DriverError::Interaction(msg) | DriverError::Internal(msg) => {
                StepError::Interaction(msg)
            }
            DriverError::SessionClosed(msg) | DriverError::Initialization(msg) => {
                StepError::SessionClosed(msg)
            }
        }
    }
}

/// Structural and control-flow errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// Job failed validation
    #[error("job validation failed: {0}")]
    ValidationFailed(String),

    /// Invalid instruction structure
    #[error("invalid instruction structure at {position}: {reason}")]
    InvalidStructure { position: String, reason: String },

    /// Jump outside the flat instruction list
    #[error("jump at {position} targets index {target} but the job has {len} instructions")]
    InvalidJump {
        position: String,
        target: usize,
        len: usize,
    },

    /// Step bound reached; guards against unconditional backward jumps
    #[error("loop limit exceeded: {0} instructions executed")]
    LoopLimitExceeded(u64),
}

impl FlowError {
    pub fn code(&self) -> &'static str {
        match self {
            FlowError::ValidationFailed(_) | FlowError::InvalidStructure { .. } => "invalid_job",
            FlowError::InvalidJump { .. } => "invalid_jump",
            FlowError::LoopLimitExceeded(_) => "loop_limit_exceeded",
        }
    }
}

/// Misuse of a run supervisor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    /// A supervisor executes exactly one attempt
    #[error("run {0} was already started; create a new supervisor to retry")]
    AlreadyStarted(String),
}
