//! Status transition rules.

use super::types::TaskStatus;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error("Cannot transition from terminal state {state:?}")]
    FromTerminalState { state: TaskStatus },
}

pub struct StatusTransition;

impl StatusTransition {
    /// Checks whether `from -> to` is allowed.
    ///
    /// Running phases only move forward (a pipeline may skip a phase it has
    /// no stage for). `Failed` and `Cancelled` are reachable from any
    /// non-terminal state, `Completed` only from a running phase.
    pub fn validate(from: TaskStatus, to: TaskStatus) -> Result<(), TransitionError> {
        if from.is_terminal() {
            return Err(TransitionError::FromTerminalState { state: from });
        }

        let is_valid = match (from, to) {
            (_, TaskStatus::Failed) | (_, TaskStatus::Cancelled) => true,
            (TaskStatus::Pending, TaskStatus::Completed) => false,
            (_, TaskStatus::Completed) => true,
            (_, TaskStatus::Pending) => false,
            (a, b) => Self::rank(b) > Self::rank(a),
        };

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from, to })
        }
    }

    /// Whether a stage may run in `status`.
    pub fn is_stage_phase(status: TaskStatus) -> bool {
        matches!(
            status,
            TaskStatus::Analyzing | TaskStatus::Generating | TaskStatus::Validating
        )
    }

    /// Position on the happy path; terminal states share the last slot.
    pub fn rank(status: TaskStatus) -> u8 {
        match status {
            TaskStatus::Pending => 0,
            TaskStatus::Analyzing => 1,
            TaskStatus::Generating => 2,
            TaskStatus::Validating => 3,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => 4,
        }
    }

    pub fn status_description(status: TaskStatus) -> &'static str {
        match status {
            TaskStatus::Pending => "Waiting to start",
            TaskStatus::Analyzing => "Analyzing request",
            TaskStatus::Generating => "Generating content",
            TaskStatus::Validating => "Validating content",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
            TaskStatus::Cancelled => "Cancelled",
        }
    }
}
