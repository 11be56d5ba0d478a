//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `taleforge_core::api` instead of reaching into internal modules.

pub use crate::config::{
    load_default, AppConfig, GenerationConfig, GenerationProvider, HttpServerConfig,
    LoggingConfig, RunnerConfig, StoreConfig, StoreKind,
};
pub use crate::error::{
    CliError, ErrorCode, OrchestratorError, PipelineError, StageError, StoreError,
    ValidationError,
};
pub use crate::orchestrator::Orchestrator;
pub use crate::pipeline::{PipelineDefinition, RunnerSettings, StageRunner, RESULT_KEY};
pub use crate::registry::{RegistryStats, TaskRegistry};
pub use crate::stage::{ContextDelta, Stage, StageContext, StageOutput, StepSpec};
pub use crate::store::{FileTaskStore, InMemoryTaskStore, TaskStore};
pub use crate::task::{
    GenerationTask, SubjectType, TaskEvent, TaskFilter, TaskRequest, TaskSnapshot, TaskStatus,
};
