use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::task::TaskRequest;

pub type ContextDelta = Map<String, Value>;

/// Accumulated state threaded through the stages of one task.
#[derive(Debug, Clone)]
pub struct StageContext {
    task_id: String,
    request: TaskRequest,
    data: Map<String, Value>,
    cancel: CancellationToken,
}

impl StageContext {
    pub fn new(task_id: impl Into<String>, request: TaskRequest, cancel: CancellationToken) -> Self {
        Self {
            task_id: task_id.into(),
            request,
            data: Map::new(),
            cancel,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn request(&self) -> &TaskRequest {
        &self.request
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Shallow merge: keys in `delta` replace existing keys.
    pub fn merge(&mut self, delta: ContextDelta) {
        for (k, v) in delta {
            self.data.insert(k, v);
        }
    }

    /// Token tripped when the task is cancelled. Stages may use it to stop
    /// waiting on their own external calls.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
