//! Public entry point: submit, query and cancel generation tasks.
//!
//! Every submitted task runs as its own tokio task. The orchestrator keeps the
//! `JoinHandle` of each run and the registry keeps a cancellation token per
//! task, so runs can be cancelled, awaited and drained on shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::RunnerConfig;
use crate::error::OrchestratorError;
use crate::pipeline::{PipelineDefinition, RunnerSettings, StageRunner};
use crate::registry::{RegistryStats, TaskRegistry};
use crate::store::TaskStore;
use crate::task::{validate_request, GenerationTask, TaskEvent, TaskFilter, TaskRequest, TaskSnapshot};

/// Error message recorded on tasks found unfinished in the store at startup.
pub const INTERRUPTED_MESSAGE: &str = "interrupted before completion";

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    registry: TaskRegistry,
    store: Arc<dyn TaskStore>,
    runner: StageRunner,
    handles: Mutex<HashMap<String, JoinHandle<Option<TaskSnapshot>>>>,
    root_token: CancellationToken,
    shutting_down: AtomicBool,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        pipeline: Arc<PipelineDefinition>,
        settings: RunnerSettings,
        event_capacity: usize,
    ) -> Self {
        let registry = TaskRegistry::new(event_capacity);
        let runner = StageRunner::new(registry.clone(), store.clone(), pipeline, settings);
        Self {
            inner: Arc::new(OrchestratorInner {
                registry,
                store,
                runner,
                handles: Mutex::new(HashMap::new()),
                root_token: CancellationToken::new(),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn from_config(
        cfg: &RunnerConfig,
        store: Arc<dyn TaskStore>,
        pipeline: Arc<PipelineDefinition>,
    ) -> Self {
        Self::new(
            store,
            pipeline,
            RunnerSettings::from(cfg),
            cfg.event_channel_capacity,
        )
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.inner.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.registry.subscribe()
    }

    pub fn pipeline_name(&self) -> &str {
        self.inner.runner.pipeline().name()
    }

    /// Validates, persists and schedules a new task. Returns without waiting
    /// for any stage to run.
    pub async fn submit(&self, request: TaskRequest) -> Result<String, OrchestratorError> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(OrchestratorError::ShuttingDown);
        }
        validate_request(&request)?;

        let task = GenerationTask::new(request);
        let task_id = task.id.clone();
        let token = self.inner.root_token.child_token();

        self.inner.registry.insert(task.clone(), token).await;
        if let Err(e) = self.inner.store.upsert(&task).await {
            self.inner.registry.evict(&task_id).await;
            return Err(e.into());
        }
        self.inner.registry.announce_submitted(&task);

        let runner = self.inner.runner.clone();
        let run_id = task_id.clone();
        let handle = tokio::spawn(async move { runner.run(&run_id).await });

        let mut handles = self.inner.handles.lock().await;
        handles.retain(|_, h| !h.is_finished());
        handles.insert(task_id.clone(), handle);
        drop(handles);

        info!(
            task_id = %task_id,
            subject_type = %task.request.subject_type,
            title = %task.request.subject_title,
            "task submitted"
        );
        Ok(task_id)
    }

    /// Registry first, store second. `None` when neither knows the task.
    pub async fn get_status(&self, task_id: &str) -> Result<Option<TaskSnapshot>, OrchestratorError> {
        if let Some(snapshot) = self.inner.registry.snapshot(task_id).await {
            return Ok(Some(snapshot));
        }
        Ok(self
            .inner
            .store
            .get(task_id)
            .await?
            .map(|task| task.snapshot()))
    }

    /// Requests cancellation. `false` for unknown or already terminal tasks.
    ///
    /// A non-terminal record that only exists in the store is cancelled
    /// directly. If another process still runs it, that runner finds the
    /// stored terminal record at its next checkpoint and stops there.
    pub async fn cancel(&self, task_id: &str) -> Result<bool, OrchestratorError> {
        if let Some(accepted) = self.inner.registry.request_cancellation(task_id).await {
            if accepted {
                info!(task_id, "cancellation requested");
            }
            return Ok(accepted);
        }

        let Some(mut task) = self.inner.store.get(task_id).await? else {
            return Ok(false);
        };
        if !task.request_cancellation() || task.cancel().is_err() {
            return Ok(false);
        }
        match self.inner.store.upsert(&task).await {
            Ok(()) => {
                info!(task_id, "task cancelled in store");
                Ok(true)
            }
            // finished elsewhere between our read and write
            Err(e) if e.is_conflict() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list(&self, filter: &TaskFilter) -> Result<Vec<TaskSnapshot>, OrchestratorError> {
        let mut snapshots = Vec::new();
        for task in self.inner.store.list(filter).await? {
            // prefer the live view for tasks still running here
            let snapshot = match self.inner.registry.snapshot(&task.id).await {
                Some(live) => live,
                None => task.snapshot(),
            };
            snapshots.push(snapshot);
        }
        Ok(snapshots)
    }

    /// Waits for the task's run to finish and returns its final snapshot.
    pub async fn wait(&self, task_id: &str) -> Result<Option<TaskSnapshot>, OrchestratorError> {
        let handle = self.inner.handles.lock().await.remove(task_id);
        if let Some(handle) = handle {
            match handle.await {
                Ok(Some(snapshot)) => return Ok(Some(snapshot)),
                Ok(None) => {}
                Err(e) => warn!(task_id, error = %e, "task run did not finish cleanly"),
            }
        }
        self.get_status(task_id).await
    }

    /// Marks every unfinished record in the store that no runner owns as
    /// failed. Meant for startup, after a previous process died mid-run.
    pub async fn reconcile_interrupted(&self) -> Result<usize, OrchestratorError> {
        let mut count = 0;
        for mut task in self.inner.store.list(&TaskFilter::non_terminal()).await? {
            if self.inner.registry.contains(&task.id).await {
                continue;
            }
            if task.fail(INTERRUPTED_MESSAGE).is_err() {
                continue;
            }
            match self.inner.store.upsert(&task).await {
                Ok(()) => count += 1,
                Err(e) if e.is_conflict() => {}
                Err(e) => return Err(e.into()),
            }
        }
        if count > 0 {
            warn!(count, "marked interrupted tasks as failed");
        }
        Ok(count)
    }

    pub async fn stats(&self) -> RegistryStats {
        self.inner.registry.stats().await
    }

    /// Rejects new submits, cancels every running task and waits for the
    /// runs to persist their final state.
    pub async fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let active = self.inner.registry.active_ids().await;
        info!(active = active.len(), "shutting down orchestrator");

        for task_id in &active {
            self.inner.registry.request_cancellation(task_id).await;
        }
        self.inner.root_token.cancel();

        let handles: Vec<_> = self.inner.handles.lock().await.drain().collect();
        for (task_id, handle) in handles {
            if let Err(e) = handle.await {
                warn!(task_id = %task_id, error = %e, "task run did not finish cleanly");
            }
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }
}
