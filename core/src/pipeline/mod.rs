//! Pipeline definitions and the stage runner.

mod definition;
mod runner;

pub use definition::{PipelineDefinition, PlannedStep, RESULT_KEY, WEIGHT_TOLERANCE};
pub use runner::{RunnerSettings, StageRunner};
