#[allow(clippy::module_inception)]
pub mod error;
pub mod code;
pub mod task;

pub use code::ErrorCode;
pub use error::CliError;
pub use task::{OrchestratorError, PipelineError, StageError, StoreError, ValidationError};
