//! Engine error taxonomy with retry classification.
//!
//! The engine never retries on its own. Every fatal condition aborts the
//! current run and surfaces here; callers can query `retry_category()` to
//! decide whether re-running the whole pipeline makes sense.
//!
//! | Error                  | Category      | Whole-run retry |
//! |------------------------|---------------|-----------------|
//! | StageExecutionFailed   | Fatal         | yes             |
//! | ToolLoopExceeded       | Fatal         | yes             |
//! | RunCancelled           | Cancelled     | no              |
//! | UnknownStage           | Misconfigured | no              |
//! | UnknownParticipant     | Misconfigured | no              |
//! | DebateFinalized        | Misconfigured | no              |
//! | Configuration          | Misconfigured | no              |

use std::fmt;

use thiserror::Error;

use crate::state::{StateSnapshot, StoreError};

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Classification used by callers layered above a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    /// A stage or tool collaborator faulted; the run is over.
    Fatal,
    /// The run was stopped on request between stages.
    Cancelled,
    /// Wiring or configuration is wrong; retrying cannot help.
    Misconfigured,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Fatal)
    }
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Misconfigured => write!(f, "misconfigured"),
        }
    }
}

/// Fault raised while executing one stage.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    /// The executable unit reported a failure.
    #[error("unit failure: {0}")]
    Unit(String),

    /// The tool-execution collaborator reported a failure.
    #[error("tool failure: {0}")]
    Tool(String),

    /// Tool results did not pair one-to-one with the pending requests.
    #[error("tool result mismatch: {0}")]
    ToolResultMismatch(String),

    /// The unit asked for tools where no tool loop runs (debate turns and
    /// single-shot stages).
    #[error("tool calls requested outside the tool loop: {0}")]
    UnexpectedToolCalls(String),

    /// The unit wrote a key its registration does not permit.
    #[error("undeclared write to {key}")]
    UndeclaredWrite { key: String },

    /// The stage's delta was rejected by the store.
    #[error("delta rejected: {0}")]
    Store(#[from] StoreError),
}

impl StageError {
    pub fn unit(message: impl Into<String>) -> Self {
        Self::Unit(message.into())
    }

    pub fn tool(message: impl Into<String>) -> Self {
        Self::Tool(message.into())
    }
}

/// Unified error type for registry, driver, debate and pipeline operations.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Stage {stage} failed: {cause}")]
    StageExecutionFailed {
        stage: String,
        #[source]
        cause: StageError,
    },

    #[error("Stage {stage} did not finish tool use within {rounds} rounds")]
    ToolLoopExceeded { stage: String, rounds: u32 },

    #[error("Run cancelled")]
    RunCancelled,

    #[error("Debate {debate} has no participant {role}")]
    UnknownParticipant { debate: String, role: String },

    #[error("Debate under {key} already has a verdict")]
    DebateFinalized { key: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Build a `StageExecutionFailed` variant conveniently.
    pub fn stage(stage: impl Into<String>, cause: impl Into<StageError>) -> Self {
        Self::StageExecutionFailed {
            stage: stage.into(),
            cause: cause.into(),
        }
    }

    /// Classify this error for retry logic.
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::StageExecutionFailed { .. } | Self::ToolLoopExceeded { .. } => {
                RetryCategory::Fatal
            }
            Self::RunCancelled => RetryCategory::Cancelled,
            Self::UnknownStage(_)
            | Self::UnknownParticipant { .. }
            | Self::DebateFinalized { .. }
            | Self::Configuration(_) => RetryCategory::Misconfigured,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.retry_category().is_retriable()
    }

    /// Stage the error is attributed to, if any.
    pub fn stage_name(&self) -> Option<&str> {
        match self {
            Self::StageExecutionFailed { stage, .. } | Self::ToolLoopExceeded { stage, .. } => {
                Some(stage)
            }
            Self::UnknownStage(stage) => Some(stage),
            _ => None,
        }
    }
}

/// Structured failure of one run: the cause plus the last committed state.
#[derive(Debug, Clone, Error)]
#[error("run {run_id} stopped: {cause}")]
pub struct RunFailure {
    pub run_id: String,
    #[source]
    pub cause: EngineError,
    /// Snapshot as of the last committed stage
    pub snapshot: StateSnapshot,
    /// Stages whose deltas were committed, in order
    pub completed_stages: Vec<String>,
}

impl RunFailure {
    /// Cancellation is a normal stop, everything else is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self.cause, EngineError::RunCancelled)
    }
}
