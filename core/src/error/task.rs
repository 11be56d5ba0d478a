use thiserror::Error;

use super::code::ErrorCode;
use crate::task::TaskStatus;

/// A request rejected at submit time. No task id is allocated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("subject_title cannot be empty")]
    EmptyTitle,

    #[error("subject_title too long ({len} chars, max {max})")]
    TitleTooLong { len: usize, max: usize },

    #[error("subject_title contains control characters")]
    TitleControlChars,

    #[error("additional_context too long ({len} chars, max {max})")]
    ContextTooLong { len: usize, max: usize },

    #[error("too many options ({count}, max {max})")]
    TooManyOptions { count: usize, max: usize },

    #[error("invalid option key '{0}'")]
    InvalidOptionKey(String),
}

/// Unrecoverable failure raised by a stage. Fatal to the whole task.
#[derive(Error, Debug, Clone)]
#[error("stage '{stage}' failed: {message}")]
pub struct StageError {
    pub stage: String,
    pub message: String,
}

impl StageError {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store io error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to (de)serialize task record: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store backend error: {0}")]
    Backend(String),

    /// The stored record is already terminal and differs from the write.
    #[error("task {task_id} is already {status} in the store")]
    Conflict { task_id: String, status: TaskStatus },
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Problems with a pipeline definition, detected when it is built.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("pipeline '{0}' has no steps")]
    Empty(String),

    #[error("step '{label}' has invalid weight {weight}")]
    InvalidWeight { label: String, weight: f64 },

    #[error("step weights of pipeline '{pipeline}' sum to {sum}, expected 1.0")]
    WeightSum { pipeline: String, sum: f64 },

    #[error("duplicate step label '{0}'")]
    DuplicateStep(String),

    #[error("stage '{stage}' runs in phase {phase} after a later phase")]
    PhaseOrder { stage: String, phase: String },

    #[error("stage '{0}' must run in Analyzing, Generating or Validating")]
    InvalidPhase(String),
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("orchestrator is shutting down")]
    ShuttingDown,
}

impl OrchestratorError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::Store(_) => ErrorCode::StoreError,
            Self::ShuttingDown => ErrorCode::ShuttingDown,
        }
    }
}
