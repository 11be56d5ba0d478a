//! The pluggable stage contract.
//!
//! A stage declares its sub-steps up front (label + share of total work) and
//! is then asked to execute them one at a time. Every finished step is a
//! checkpoint for the runner. Stages only return data: they never touch the
//! registry or the store.
//!
//! Recoverable trouble inside a stage (a failed or malformed text-generation
//! call, rate limiting) must be absorbed there, usually by returning a
//! fallback delta. Returning `Err` fails the whole task.

mod context;

pub use context::{ContextDelta, StageContext};

use async_trait::async_trait;

use crate::error::StageError;
use crate::task::TaskStatus;

/// One sub-step of a stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSpec {
    pub label: String,
    pub weight: f64,
}

impl StepSpec {
    pub fn new(label: impl Into<String>, weight: f64) -> Self {
        Self {
            label: label.into(),
            weight,
        }
    }
}

/// What a step hands back to the runner.
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    pub delta: ContextDelta,
    /// Overrides the step label as the task's `current_step`.
    pub step_label: Option<String>,
}

impl StageOutput {
    pub fn new(delta: ContextDelta) -> Self {
        Self {
            delta,
            step_label: None,
        }
    }

    pub fn with_value(key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut delta = ContextDelta::new();
        delta.insert(key.into(), value);
        Self::new(delta)
    }

    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.step_label = Some(label.into());
        self
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    /// The task status while this stage runs: Analyzing, Generating or Validating.
    fn phase(&self) -> TaskStatus;

    /// Ordered sub-steps. Must not change between calls.
    fn steps(&self) -> Vec<StepSpec>;

    async fn execute(&self, step: &StepSpec, ctx: &StageContext) -> Result<StageOutput, StageError>;
}
