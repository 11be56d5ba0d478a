//! The persisted task record and its guarded mutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transitions::{StatusTransition, TransitionError};
use super::types::{TaskRequest, TaskSnapshot, TaskStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationTask {
    pub id: String,
    pub request: TaskRequest,
    pub status: TaskStatus,
    pub progress: f64,
    pub current_step: String,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub cancellation_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationTask {
    pub fn new(request: TaskRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            request,
            status: TaskStatus::Pending,
            progress: 0.0,
            current_step: StatusTransition::status_description(TaskStatus::Pending).to_string(),
            result: None,
            error_message: None,
            cancellation_requested: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            task_id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            current_step: self.current_step.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            result_ref: self.result.clone(),
            error: self.error_message.clone(),
            cancellation_requested: self.cancellation_requested,
        }
    }

    /// Moves into a running phase. Entering the current phase again is a no-op.
    pub fn enter_phase(&mut self, status: TaskStatus, step: &str) -> Result<(), TransitionError> {
        if self.status == status && !self.is_terminal() {
            return Ok(());
        }
        StatusTransition::validate(self.status, status)?;
        self.status = status;
        self.current_step = step.to_string();
        self.touch();
        Ok(())
    }

    /// Records a finished sub-step. Progress never decreases and never exceeds 1.0.
    pub fn record_checkpoint(&mut self, progress: f64, step: &str) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::FromTerminalState { state: self.status });
        }
        if progress.is_finite() {
            self.progress = self.progress.max(progress.clamp(0.0, 1.0));
        }
        self.current_step = step.to_string();
        self.touch();
        Ok(())
    }

    /// Sets the cancellation flag. Returns false when the task is already terminal.
    pub fn request_cancellation(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        if !self.cancellation_requested {
            self.cancellation_requested = true;
            self.touch();
        }
        true
    }

    pub fn complete(&mut self, result: serde_json::Value) -> Result<(), TransitionError> {
        StatusTransition::validate(self.status, TaskStatus::Completed)?;
        self.status = TaskStatus::Completed;
        self.progress = 1.0;
        self.current_step = StatusTransition::status_description(TaskStatus::Completed).to_string();
        self.result = Some(result);
        self.error_message = None;
        self.touch();
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        StatusTransition::validate(self.status, TaskStatus::Failed)?;
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "unknown error".to_string();
        }
        self.status = TaskStatus::Failed;
        self.result = None;
        self.error_message = Some(message);
        self.touch();
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        StatusTransition::validate(self.status, TaskStatus::Cancelled)?;
        self.status = TaskStatus::Cancelled;
        self.cancellation_requested = true;
        self.result = None;
        self.error_message = None;
        self.current_step = StatusTransition::status_description(TaskStatus::Cancelled).to_string();
        self.touch();
        Ok(())
    }

    /// Task duration in milliseconds, up to the last update.
    pub fn duration_ms(&self) -> u64 {
        (self.updated_at - self.created_at)
            .num_milliseconds()
            .max(0) as u64
    }

    fn touch(&mut self) {
        let now = Utc::now();
        // updated_at never goes backwards, even across clock adjustments
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}
