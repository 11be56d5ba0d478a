use thiserror::Error;

use super::code::ErrorCode;
use super::task::{OrchestratorError, StoreError};

#[derive(Error, Debug)]
pub enum CliError {
    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl CliError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Orchestrator(e) => e.error_code(),
            Self::Store(_) => ErrorCode::StoreError,
            Self::TaskNotFound(_) => ErrorCode::TaskNotFound,
            Self::Command(_) | Self::Config(_) | Self::Io(_) | Self::Anyhow(_) => {
                ErrorCode::GeneralError
            }
        }
    }
}
