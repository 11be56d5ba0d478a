use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use super::definition::PipelineDefinition;
use crate::config::RunnerConfig;
use crate::registry::{TaskRegistry, TerminalOutcome};
use crate::stage::{Stage, StageContext, StageOutput, StepSpec};
use crate::store::{persist_with_retry, RetryPolicy, TaskStore};
use crate::task::{GenerationTask, TaskSnapshot, TaskStatus};

#[derive(Debug, Clone, Copy)]
pub struct RunnerSettings {
    /// Retry policy for the terminal-state write.
    pub terminal_retry: RetryPolicy,
    /// Stop awaiting an in-flight stage call once the task is cancelled.
    pub abandon_in_flight_on_cancel: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            terminal_retry: RetryPolicy::default(),
            abandon_in_flight_on_cancel: false,
        }
    }
}

impl From<&RunnerConfig> for RunnerSettings {
    fn from(cfg: &RunnerConfig) -> Self {
        Self {
            terminal_retry: RetryPolicy::new(
                cfg.terminal_persist_attempts,
                cfg.terminal_persist_backoff_ms,
            ),
            abandon_in_flight_on_cancel: cfg.abandon_in_flight_on_cancel,
        }
    }
}

/// How `drive` ended.
enum RunEnd {
    Outcome(TerminalOutcome),
    /// Another process already stored a terminal record for the task.
    Superseded(GenerationTask),
}

enum StepResult {
    Done(StageOutput),
    Failed(String),
    Abandoned,
}

/// Drives one task at a time through a pipeline definition.
///
/// The runner is the only writer of a registered task's record: it moves the
/// status through the pipeline phases, adds each finished step's weight to
/// progress, persists every checkpoint and checks the cancellation flag
/// before each step.
#[derive(Clone)]
pub struct StageRunner {
    registry: TaskRegistry,
    store: Arc<dyn TaskStore>,
    pipeline: Arc<PipelineDefinition>,
    settings: RunnerSettings,
}

impl StageRunner {
    pub fn new(
        registry: TaskRegistry,
        store: Arc<dyn TaskStore>,
        pipeline: Arc<PipelineDefinition>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            registry,
            store,
            pipeline,
            settings,
        }
    }

    pub fn pipeline(&self) -> &PipelineDefinition {
        &self.pipeline
    }

    /// Runs the task to a terminal state and returns its final snapshot.
    ///
    /// `None` if the task is not registered.
    pub async fn run(&self, task_id: &str) -> Option<TaskSnapshot> {
        let Some(task) = self.registry.task(task_id).await else {
            warn!(task_id, "runner started for unregistered task");
            return None;
        };
        let cancel = self
            .registry
            .cancellation_token(task_id)
            .await
            .unwrap_or_default();

        info!(
            task_id,
            pipeline = self.pipeline.name(),
            subject_type = %task.request.subject_type,
            "task started"
        );
        let mut ctx = StageContext::new(task_id, task.request, cancel);
        match self.drive(task_id, &mut ctx).await {
            RunEnd::Outcome(outcome) => self.finish(task_id, outcome).await,
            RunEnd::Superseded(stored) => self.adopt(task_id, stored).await,
        }
    }

    async fn drive(&self, task_id: &str, ctx: &mut StageContext) -> RunEnd {
        let mut progress = 0.0;
        let mut phase = TaskStatus::Pending;

        for planned in self.pipeline.plan() {
            if self.registry.is_cancellation_requested(task_id).await {
                debug!(task_id, step = %planned.step.label, "cancellation observed at checkpoint");
                return RunEnd::Outcome(TerminalOutcome::Cancelled);
            }

            let Some(stage) = self.pipeline.stage(planned.stage_index) else {
                return RunEnd::Outcome(TerminalOutcome::Failed(format!(
                    "pipeline '{}' has no stage #{}",
                    self.pipeline.name(),
                    planned.stage_index
                )));
            };

            if planned.phase != phase {
                match self
                    .registry
                    .enter_phase(task_id, planned.phase, &planned.step.label)
                    .await
                {
                    Ok(task) => {
                        if let Err(stored) = self.persist_checkpoint(&task).await {
                            return RunEnd::Superseded(stored);
                        }
                    }
                    Err(e) => return RunEnd::Outcome(TerminalOutcome::Failed(e.to_string())),
                }
                phase = planned.phase;
            } else if let Err(e) = self.registry.mark_step(task_id, &planned.step.label).await {
                return RunEnd::Outcome(TerminalOutcome::Failed(e.to_string()));
            }

            debug!(
                task_id,
                stage = stage.name(),
                step = %planned.step.label,
                "step started"
            );
            let output = match self.execute_step(stage.as_ref(), &planned.step, ctx).await {
                StepResult::Done(output) => output,
                StepResult::Failed(message) => {
                    warn!(task_id, stage = stage.name(), error = %message, "stage failed");
                    return RunEnd::Outcome(TerminalOutcome::Failed(message));
                }
                StepResult::Abandoned => {
                    debug!(task_id, stage = stage.name(), "in-flight stage call abandoned");
                    return RunEnd::Outcome(TerminalOutcome::Cancelled);
                }
            };

            let label = output
                .step_label
                .clone()
                .unwrap_or_else(|| planned.step.label.clone());
            ctx.merge(output.delta);
            progress += planned.step.weight;

            match self
                .registry
                .record_checkpoint(task_id, progress, &label)
                .await
            {
                Ok(task) => {
                    debug!(task_id, step = %label, progress = task.progress, "checkpoint");
                    if let Err(stored) = self.persist_checkpoint(&task).await {
                        return RunEnd::Superseded(stored);
                    }
                }
                Err(e) => return RunEnd::Outcome(TerminalOutcome::Failed(e.to_string())),
            }
        }

        if self.registry.is_cancellation_requested(task_id).await {
            return RunEnd::Outcome(TerminalOutcome::Cancelled);
        }
        RunEnd::Outcome(TerminalOutcome::Completed(self.pipeline.assemble_result(ctx)))
    }

    async fn execute_step(
        &self,
        stage: &dyn Stage,
        step: &StepSpec,
        ctx: &StageContext,
    ) -> StepResult {
        let call = AssertUnwindSafe(stage.execute(step, ctx)).catch_unwind();

        let res = if self.settings.abandon_in_flight_on_cancel {
            tokio::select! {
                biased;
                _ = ctx.cancellation().cancelled() => return StepResult::Abandoned,
                res = call => res,
            }
        } else {
            call.await
        };

        match res {
            Ok(Ok(output)) => StepResult::Done(output),
            Ok(Err(e)) => StepResult::Failed(e.to_string()),
            Err(panic) => StepResult::Failed(format!(
                "stage '{}' panicked: {}",
                stage.name(),
                panic_message(panic.as_ref())
            )),
        }
    }

    /// Intermediate writes are best effort: a failure is logged and the run
    /// continues. `Err` carries the stored terminal record when the store
    /// refuses the write because the task already ended elsewhere.
    async fn persist_checkpoint(&self, task: &GenerationTask) -> Result<(), GenerationTask> {
        match self.store.upsert(task).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_conflict() => match self.stored_terminal(&task.id).await {
                Some(stored) => Err(stored),
                None => Ok(()),
            },
            Err(e) => {
                warn!(
                    task_id = %task.id,
                    store = self.store.name(),
                    error = %e,
                    "checkpoint persist failed"
                );
                Ok(())
            }
        }
    }

    async fn stored_terminal(&self, task_id: &str) -> Option<GenerationTask> {
        match self.store.get(task_id).await {
            Ok(Some(stored)) if stored.is_terminal() => Some(stored),
            Ok(_) => None,
            Err(e) => {
                warn!(task_id, error = %e, "could not read the conflicting record");
                None
            }
        }
    }

    async fn adopt(&self, task_id: &str, stored: GenerationTask) -> Option<TaskSnapshot> {
        info!(
            task_id,
            status = %stored.status,
            "task already ended in the store, stopping"
        );
        match self.registry.adopt(task_id, stored).await {
            Ok(task) => {
                self.registry.evict(task_id).await;
                Some(task.snapshot())
            }
            Err(e) => {
                error!(task_id, error = %e, "could not adopt stored terminal state");
                self.registry.snapshot(task_id).await
            }
        }
    }

    async fn finish(&self, task_id: &str, outcome: TerminalOutcome) -> Option<TaskSnapshot> {
        let task = match self.registry.finish(task_id, outcome).await {
            Ok(task) => task,
            Err(e) => {
                error!(task_id, error = %e, "could not move task to a terminal state");
                return self.registry.snapshot(task_id).await;
            }
        };

        match persist_with_retry(self.store.as_ref(), &task, self.settings.terminal_retry).await {
            Ok(()) => {
                self.registry.evict(task_id).await;
            }
            Err(e) if e.is_conflict() => {
                if let Some(stored) = self.stored_terminal(task_id).await {
                    return self.adopt(task_id, stored).await;
                }
                error!(task_id, error = %e, "terminal state conflicts with an unreadable record");
            }
            Err(e) => {
                // Serve the terminal snapshot from memory until a background
                // write lands; the store still holds the last checkpoint.
                error!(
                    task_id,
                    store = self.store.name(),
                    error = %e,
                    "terminal state not persisted, retrying in background"
                );
                self.spawn_terminal_repersist(task.clone());
            }
        }

        match task.status {
            TaskStatus::Failed => warn!(
                task_id,
                error = task.error_message.as_deref().unwrap_or_default(),
                "task failed"
            ),
            status => info!(
                task_id,
                status = %status,
                progress = task.progress,
                duration_ms = task.duration_ms(),
                "task finished"
            ),
        }
        Some(task.snapshot())
    }
}

impl StageRunner {
    /// Keeps writing the terminal record at the policy's longest backoff until
    /// the store accepts it, then evicts the task. If the process exits first,
    /// the store keeps the last checkpoint and the next startup reconciles the
    /// task as interrupted.
    fn spawn_terminal_repersist(&self, task: GenerationTask) {
        let runner = self.clone();
        let interval = self
            .settings
            .terminal_retry
            .backoff(self.settings.terminal_retry.attempts);
        tokio::spawn(async move {
            let task_id = task.id.clone();
            let mut attempts = 0u64;
            loop {
                tokio::time::sleep(interval).await;
                if !runner.registry.contains(&task_id).await {
                    return;
                }
                attempts += 1;
                match runner.store.upsert(&task).await {
                    Ok(()) => {
                        runner.registry.evict(&task_id).await;
                        info!(task_id = %task_id, attempts, "terminal state persisted");
                        return;
                    }
                    Err(e) if e.is_conflict() => {
                        if let Some(stored) = runner.stored_terminal(&task_id).await {
                            runner.adopt(&task_id, stored).await;
                        } else {
                            runner.registry.evict(&task_id).await;
                        }
                        return;
                    }
                    Err(e) => debug!(task_id = %task_id, attempts, error = %e, "terminal persist still failing"),
                }
            }
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
