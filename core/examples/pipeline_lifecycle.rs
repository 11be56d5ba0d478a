//! Runs a two-stage pipeline against the in-memory store and prints every
//! lifecycle event the registry broadcasts.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use taleforge_core::error::StageError;
use taleforge_core::orchestrator::Orchestrator;
use taleforge_core::pipeline::{PipelineDefinition, RunnerSettings, RESULT_KEY};
use taleforge_core::stage::{Stage, StageContext, StageOutput, StepSpec};
use taleforge_core::store::InMemoryTaskStore;
use taleforge_core::task::{SubjectType, TaskEvent, TaskRequest, TaskStatus};

struct Sketch;

#[async_trait]
impl Stage for Sketch {
    fn name(&self) -> &str {
        "sketch"
    }

    fn phase(&self) -> TaskStatus {
        TaskStatus::Generating
    }

    fn steps(&self) -> Vec<StepSpec> {
        vec![StepSpec::new("outline", 0.5), StepSpec::new("details", 0.3)]
    }

    async fn execute(&self, step: &StepSpec, ctx: &StageContext) -> Result<StageOutput, StageError> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(StageOutput::with_value(
            step.label.clone(),
            json!(format!("{} for {}", step.label, ctx.request().subject_title)),
        ))
    }
}

struct Assemble;

#[async_trait]
impl Stage for Assemble {
    fn name(&self) -> &str {
        "assemble"
    }

    fn phase(&self) -> TaskStatus {
        TaskStatus::Validating
    }

    fn steps(&self) -> Vec<StepSpec> {
        vec![StepSpec::new("assemble", 0.2)]
    }

    async fn execute(&self, _step: &StepSpec, ctx: &StageContext) -> Result<StageOutput, StageError> {
        Ok(StageOutput::with_value(RESULT_KEY, json!(ctx.data())))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let pipeline = PipelineDefinition::new("sketch", vec![Arc::new(Sketch), Arc::new(Assemble)])?;
    let orch = Orchestrator::new(
        Arc::new(InMemoryTaskStore::new()),
        Arc::new(pipeline),
        RunnerSettings::default(),
        64,
    );

    let mut events = orch.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match &event {
                TaskEvent::StatusChanged { new_status, .. } => println!("status   -> {new_status}"),
                TaskEvent::Progress { progress, step, .. } => {
                    println!("progress -> {:>3.0}% ({step})", progress * 100.0)
                }
                other => println!("event    -> {other:?}"),
            }
            if event.is_terminal() {
                break;
            }
        }
    });

    let id = orch
        .submit(TaskRequest::new("Saltmarsh Compact", SubjectType::Faction))
        .await?;
    let done = orch.wait(&id).await?;
    printer.await?;

    if let Some(snapshot) = done {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }
    Ok(())
}
