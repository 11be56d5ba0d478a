//! In-memory registry of running tasks.
//!
//! The key set lives behind one `RwLock`; every record has its own `Mutex`, so
//! runners updating different tasks only contend on the short read lock of the
//! map. `submit` inserts, terminal cleanup evicts, runners and `cancel` mutate
//! single entries. Each mutation happens under the entry lock and returns the
//! updated record, so readers never see a half-applied checkpoint.

mod stats;

pub use stats::RegistryStats;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::task::{GenerationTask, TaskEvent, TaskSnapshot, TaskStatus, TransitionError};

pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("task {0} is not registered")]
    NotFound(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// How a runner wants to end a task.
#[derive(Debug, Clone)]
pub enum TerminalOutcome {
    Completed(serde_json::Value),
    Failed(String),
    Cancelled,
}

struct RegistryEntry {
    task: Mutex<GenerationTask>,
    cancel: CancellationToken,
}

#[derive(Clone)]
pub struct TaskRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    tasks: RwLock<HashMap<String, Arc<RegistryEntry>>>,
    event_tx: broadcast::Sender<TaskEvent>,
}

impl TaskRegistry {
    pub fn new(event_capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(event_capacity.max(1));
        Self {
            inner: Arc::new(RegistryInner {
                tasks: RwLock::new(HashMap::new()),
                event_tx,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.event_tx.subscribe()
    }

    fn emit(&self, event: TaskEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    async fn entry(&self, task_id: &str) -> Option<Arc<RegistryEntry>> {
        self.inner.tasks.read().await.get(task_id).cloned()
    }

    async fn entry_or_err(&self, task_id: &str) -> Result<Arc<RegistryEntry>, RegistryError> {
        self.entry(task_id)
            .await
            .ok_or_else(|| RegistryError::NotFound(task_id.to_string()))
    }

    pub async fn insert(&self, task: GenerationTask, cancel: CancellationToken) {
        let task_id = task.id.clone();
        let entry = Arc::new(RegistryEntry {
            task: Mutex::new(task),
            cancel,
        });
        self.inner.tasks.write().await.insert(task_id, entry);
    }

    /// Announces a task once its Pending record is stored.
    pub fn announce_submitted(&self, task: &GenerationTask) {
        self.emit(TaskEvent::Submitted {
            task_id: task.id.clone(),
            subject_type: task.request.subject_type,
            timestamp: Utc::now(),
        });
    }

    pub async fn evict(&self, task_id: &str) -> Option<GenerationTask> {
        let entry = self.inner.tasks.write().await.remove(task_id)?;
        let task = entry.task.lock().await.clone();
        Some(task)
    }

    pub async fn contains(&self, task_id: &str) -> bool {
        self.inner.tasks.read().await.contains_key(task_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.tasks.read().await.is_empty()
    }

    pub async fn active_ids(&self) -> Vec<String> {
        self.inner.tasks.read().await.keys().cloned().collect()
    }

    pub async fn snapshot(&self, task_id: &str) -> Option<TaskSnapshot> {
        let entry = self.entry(task_id).await?;
        let task = entry.task.lock().await;
        Some(task.snapshot())
    }

    pub async fn task(&self, task_id: &str) -> Option<GenerationTask> {
        let entry = self.entry(task_id).await?;
        let task = entry.task.lock().await.clone();
        Some(task)
    }

    pub async fn cancellation_token(&self, task_id: &str) -> Option<CancellationToken> {
        self.entry(task_id).await.map(|e| e.cancel.clone())
    }

    pub async fn is_cancellation_requested(&self, task_id: &str) -> bool {
        match self.entry(task_id).await {
            Some(entry) => entry.task.lock().await.cancellation_requested,
            None => false,
        }
    }

    /// Flags a task for cancellation and trips its token.
    ///
    /// `None` when the task is not registered, `Some(false)` when it is
    /// already terminal.
    pub async fn request_cancellation(&self, task_id: &str) -> Option<bool> {
        let entry = self.entry(task_id).await?;
        let mut task = entry.task.lock().await;
        let first_request = !task.cancellation_requested;
        if !task.request_cancellation() {
            return Some(false);
        }
        entry.cancel.cancel();
        drop(task);

        if first_request {
            self.emit(TaskEvent::CancellationRequested {
                task_id: task_id.to_string(),
                timestamp: Utc::now(),
            });
        }
        Some(true)
    }

    pub async fn enter_phase(
        &self,
        task_id: &str,
        status: TaskStatus,
        step: &str,
    ) -> Result<GenerationTask, RegistryError> {
        let entry = self.entry_or_err(task_id).await?;
        let mut task = entry.task.lock().await;
        let old_status = task.status;
        task.enter_phase(status, step)?;
        let updated = task.clone();
        drop(task);

        if old_status != status {
            self.emit(TaskEvent::StatusChanged {
                task_id: task_id.to_string(),
                old_status,
                new_status: status,
                timestamp: Utc::now(),
            });
        }
        Ok(updated)
    }

    /// Updates `current_step` without moving progress.
    pub async fn mark_step(&self, task_id: &str, step: &str) -> Result<(), RegistryError> {
        let entry = self.entry_or_err(task_id).await?;
        let mut task = entry.task.lock().await;
        let progress = task.progress;
        task.record_checkpoint(progress, step)?;
        Ok(())
    }

    pub async fn record_checkpoint(
        &self,
        task_id: &str,
        progress: f64,
        step: &str,
    ) -> Result<GenerationTask, RegistryError> {
        let entry = self.entry_or_err(task_id).await?;
        let mut task = entry.task.lock().await;
        task.record_checkpoint(progress, step)?;
        let updated = task.clone();
        drop(task);

        self.emit(TaskEvent::Progress {
            task_id: task_id.to_string(),
            progress: updated.progress,
            step: step.to_string(),
            timestamp: Utc::now(),
        });
        Ok(updated)
    }

    /// Moves a task into its terminal state.
    ///
    /// Cancellation wins: if the flag is set when the runner tries to
    /// complete or fail, the task ends `Cancelled` and the outcome is dropped.
    pub async fn finish(
        &self,
        task_id: &str,
        outcome: TerminalOutcome,
    ) -> Result<GenerationTask, RegistryError> {
        let entry = self.entry_or_err(task_id).await?;
        let mut task = entry.task.lock().await;

        let outcome = if task.cancellation_requested {
            TerminalOutcome::Cancelled
        } else {
            outcome
        };

        match outcome {
            TerminalOutcome::Completed(result) => task.complete(result)?,
            TerminalOutcome::Failed(message) => task.fail(message)?,
            TerminalOutcome::Cancelled => {
                task.cancel()?;
                entry.cancel.cancel();
            }
        }
        let updated = task.clone();
        drop(task);

        if let Some(event) = terminal_event(&updated) {
            self.emit(event);
        }
        Ok(updated)
    }

    /// Replaces a running task with the terminal record another process
    /// already stored for it, and trips its token.
    pub async fn adopt(
        &self,
        task_id: &str,
        stored: GenerationTask,
    ) -> Result<GenerationTask, RegistryError> {
        let entry = self.entry_or_err(task_id).await?;
        let mut task = entry.task.lock().await;
        let old_status = task.status;
        *task = stored;
        entry.cancel.cancel();
        let updated = task.clone();
        drop(task);

        if old_status != updated.status {
            if let Some(event) = terminal_event(&updated) {
                self.emit(event);
            }
        }
        Ok(updated)
    }

    pub async fn stats(&self) -> RegistryStats {
        let entries: Vec<_> = self.inner.tasks.read().await.values().cloned().collect();
        let mut stats = RegistryStats::default();
        for entry in entries {
            stats.record(entry.task.lock().await.status);
        }
        stats
    }
}

fn terminal_event(task: &GenerationTask) -> Option<TaskEvent> {
    let task_id = task.id.clone();
    let timestamp = Utc::now();
    match task.status {
        TaskStatus::Completed => Some(TaskEvent::Completed {
            task_id,
            duration_ms: task.duration_ms(),
            timestamp,
        }),
        TaskStatus::Failed => Some(TaskEvent::Failed {
            task_id,
            error: task.error_message.clone().unwrap_or_default(),
            timestamp,
        }),
        TaskStatus::Cancelled => Some(TaskEvent::Cancelled {
            task_id,
            progress: task.progress,
            timestamp,
        }),
        _ => None,
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
