use serde::Serialize;

use crate::task::TaskStatus;

/// Count of registered tasks per status.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RegistryStats {
    pub pending: usize,
    pub analyzing: usize,
    pub generating: usize,
    pub validating: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl RegistryStats {
    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Analyzing => self.analyzing += 1,
            TaskStatus::Generating => self.generating += 1,
            TaskStatus::Validating => self.validating += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn running(&self) -> usize {
        self.analyzing + self.generating + self.validating
    }

    pub fn total(&self) -> usize {
        self.pending + self.running() + self.completed + self.failed + self.cancelled
    }
}
