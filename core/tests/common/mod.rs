#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use taleforge_core::error::{StageError, StoreError};
use taleforge_core::pipeline::{PipelineDefinition, RESULT_KEY};
use taleforge_core::stage::{Stage, StageContext, StageOutput, StepSpec};
use taleforge_core::store::{InMemoryTaskStore, TaskStore};
use taleforge_core::task::{GenerationTask, TaskFilter, TaskStatus};
use tokio::sync::{mpsc, Semaphore};

/// Lets a test hold every step until it releases it, and see which step is running.
pub struct Gate {
    entered_tx: mpsc::UnboundedSender<String>,
    permits: Semaphore,
}

impl Gate {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (entered_tx, entered_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                entered_tx,
                permits: Semaphore::new(0),
            }),
            entered_rx,
        )
    }

    pub fn release(&self, steps: usize) {
        self.permits.add_permits(steps);
    }

    async fn pass(&self, label: &str) {
        let _ = self.entered_tx.send(label.to_string());
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }
}

#[derive(Clone, Default)]
pub enum Behavior {
    #[default]
    Succeed,
    FailOn(&'static str),
    PanicOn(&'static str),
    HangOn(&'static str),
}

pub struct ScriptedStage {
    name: &'static str,
    phase: TaskStatus,
    steps: Vec<(&'static str, f64)>,
    behavior: Behavior,
    gate: Option<Arc<Gate>>,
    calls: Arc<CallLog>,
}

#[derive(Default)]
pub struct CallLog {
    steps: Mutex<Vec<String>>,
    count: AtomicUsize,
}

impl CallLog {
    pub fn steps(&self) -> Vec<String> {
        self.steps.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn record(&self, label: &str) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.steps.lock().unwrap().push(label.to_string());
    }
}

#[async_trait]
impl Stage for ScriptedStage {
    fn name(&self) -> &str {
        self.name
    }

    fn phase(&self) -> TaskStatus {
        self.phase
    }

    fn steps(&self) -> Vec<StepSpec> {
        self.steps
            .iter()
            .map(|(label, weight)| StepSpec::new(*label, *weight))
            .collect()
    }

    async fn execute(&self, step: &StepSpec, ctx: &StageContext) -> Result<StageOutput, StageError> {
        self.calls.record(&step.label);
        if let Some(gate) = &self.gate {
            gate.pass(&step.label).await;
        }

        let requested_failure = ctx.request().options.get("fail_on").and_then(|v| v.as_str());
        if requested_failure == Some(step.label.as_str()) {
            return Err(StageError::new(self.name, format!("{} rejected by request", step.label)));
        }

        match &self.behavior {
            Behavior::FailOn(label) if *label == step.label => {
                return Err(StageError::new(self.name, format!("{label} exploded")));
            }
            Behavior::PanicOn(label) if *label == step.label => {
                panic!("{label} panicked");
            }
            Behavior::HangOn(label) if *label == step.label => {
                std::future::pending::<()>().await;
            }
            _ => {}
        }

        if step.label == "assemble" {
            let title = ctx.request().subject_title.clone();
            return Ok(StageOutput::with_value(
                RESULT_KEY,
                json!({ "title": title, "parts": ctx.data().len() }),
            ));
        }
        Ok(StageOutput::with_value(step.label.clone(), json!({ "done": true })))
    }
}

pub struct PipelineKit {
    pub pipeline: Arc<PipelineDefinition>,
    pub calls: Arc<CallLog>,
}

/// analysis(0.2) | content: world(0.25) characters(0.2) narrative(0.2) | validation: validate(0.1) assemble(0.05)
pub fn standard_pipeline(behavior: Behavior, gate: Option<Arc<Gate>>) -> PipelineKit {
    let calls = Arc::new(CallLog::default());
    let stage = |name, phase, steps| -> Arc<dyn Stage> {
        Arc::new(ScriptedStage {
            name,
            phase,
            steps,
            behavior: behavior.clone(),
            gate: gate.clone(),
            calls: calls.clone(),
        })
    };
    let pipeline = PipelineDefinition::new(
        "test-content",
        vec![
            stage("analysis", TaskStatus::Analyzing, vec![("analyze", 0.2)]),
            stage(
                "content",
                TaskStatus::Generating,
                vec![("world", 0.25), ("characters", 0.2), ("narrative", 0.2)],
            ),
            stage(
                "validation",
                TaskStatus::Validating,
                vec![("validate", 0.1), ("assemble", 0.05)],
            ),
        ],
    )
    .expect("valid test pipeline");
    PipelineKit {
        pipeline: Arc::new(pipeline),
        calls,
    }
}

/// In-memory store that can be told to fail the submit, checkpoint or
/// terminal writes, and keeps every write it accepted.
#[derive(Default)]
pub struct RecordingStore {
    inner: InMemoryTaskStore,
    pub fail_pending: AtomicBool,
    pub fail_checkpoints: AtomicBool,
    pub fail_terminal: AtomicBool,
    writes: Mutex<HashMap<String, Vec<GenerationTask>>>,
}

impl RecordingStore {
    pub fn writes_for(&self, task_id: &str) -> Vec<GenerationTask> {
        self.writes
            .lock()
            .unwrap()
            .get(task_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TaskStore for RecordingStore {
    fn name(&self) -> &str {
        "recording"
    }

    async fn get(&self, task_id: &str) -> Result<Option<GenerationTask>, StoreError> {
        self.inner.get(task_id).await
    }

    async fn upsert(&self, task: &GenerationTask) -> Result<(), StoreError> {
        if task.status == TaskStatus::Pending && self.fail_pending.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("submit write rejected".into()));
        }
        let is_checkpoint = !task.is_terminal() && task.status != TaskStatus::Pending;
        if is_checkpoint && self.fail_checkpoints.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("checkpoint write rejected".into()));
        }
        if task.is_terminal() && self.fail_terminal.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("terminal write rejected".into()));
        }
        self.writes
            .lock()
            .unwrap()
            .entry(task.id.clone())
            .or_default()
            .push(task.clone());
        self.inner.upsert(task).await
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<GenerationTask>, StoreError> {
        self.inner.list(filter).await
    }
}
