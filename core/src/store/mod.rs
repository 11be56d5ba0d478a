//! Durable task record storage.
//!
//! The core only relies on the contract below: `upsert` is atomic per task id
//! and a read that follows a write from the same process sees that write.
//!
//! A terminal record is final. Several processes may share one store (a
//! server and one-shot CLI commands), so `upsert` refuses to replace a
//! terminal record with a different one and returns [`StoreError::Conflict`].

mod file;
mod memory;
pub mod retry;

pub use file::FileTaskStore;
pub use memory::InMemoryTaskStore;
pub use retry::{persist_with_retry, RetryPolicy};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::task::{GenerationTask, TaskFilter};

#[async_trait]
pub trait TaskStore: Send + Sync {
    fn name(&self) -> &str;
    async fn get(&self, task_id: &str) -> Result<Option<GenerationTask>, StoreError>;
    async fn upsert(&self, task: &GenerationTask) -> Result<(), StoreError>;
    async fn list(&self, filter: &TaskFilter) -> Result<Vec<GenerationTask>, StoreError>;
}

/// Rejects a write that would replace a terminal record. Rewriting the
/// identical record is allowed so retried writes stay idempotent.
pub(crate) fn check_replace(
    stored: Option<&GenerationTask>,
    incoming: &GenerationTask,
) -> Result<(), StoreError> {
    match stored {
        Some(stored) if stored.is_terminal() && stored != incoming => Err(StoreError::Conflict {
            task_id: stored.id.clone(),
            status: stored.status,
        }),
        _ => Ok(()),
    }
}

/// Sorts oldest first and applies the filter's limit.
pub(crate) fn finish_listing(mut tasks: Vec<GenerationTask>, filter: &TaskFilter) -> Vec<GenerationTask> {
    tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    if let Some(limit) = filter.limit {
        tasks.truncate(limit);
    }
    tasks
}
