//! Lifecycle events broadcast by the task registry.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::{SubjectType, TaskStatus};

#[derive(Debug, Clone, Serialize)]
pub enum TaskEvent {
    Submitted {
        task_id: String,
        subject_type: SubjectType,
        timestamp: DateTime<Utc>,
    },
    StatusChanged {
        task_id: String,
        old_status: TaskStatus,
        new_status: TaskStatus,
        timestamp: DateTime<Utc>,
    },
    Progress {
        task_id: String,
        progress: f64,
        step: String,
        timestamp: DateTime<Utc>,
    },
    CancellationRequested {
        task_id: String,
        timestamp: DateTime<Utc>,
    },
    Completed {
        task_id: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    Failed {
        task_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    Cancelled {
        task_id: String,
        progress: f64,
        timestamp: DateTime<Utc>,
    },
}

impl TaskEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Submitted { timestamp, .. }
            | Self::StatusChanged { timestamp, .. }
            | Self::Progress { timestamp, .. }
            | Self::CancellationRequested { timestamp, .. }
            | Self::Completed { timestamp, .. }
            | Self::Failed { timestamp, .. }
            | Self::Cancelled { timestamp, .. } => *timestamp,
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            Self::Submitted { task_id, .. }
            | Self::StatusChanged { task_id, .. }
            | Self::Progress { task_id, .. }
            | Self::CancellationRequested { task_id, .. }
            | Self::Completed { task_id, .. }
            | Self::Failed { task_id, .. }
            | Self::Cancelled { task_id, .. } => task_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }
}
