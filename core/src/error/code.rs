/// Stable error codes surfaced to callers (HTTP bodies, CLI exit codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    Success = 0,
    GeneralError = 1,
    ValidationError = 3,
    TaskNotFound = 10,
    PipelineDefinition = 12,
    StageFailed = 20,
    Cancelled = 31,
    StoreError = 60,
    ShuttingDown = 70,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::GeneralError => "general_error",
            Self::ValidationError => "validation_error",
            Self::TaskNotFound => "task_not_found",
            Self::PipelineDefinition => "pipeline_definition",
            Self::StageFailed => "stage_failed",
            Self::Cancelled => "cancelled",
            Self::StoreError => "store_error",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
