//! Request and response bodies of the task API.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use taleforge_core::api::{
    ErrorCode, OrchestratorError, RegistryStats, SubjectType, TaskRequest, TaskSnapshot,
};

#[derive(Debug, Deserialize)]
pub struct SubmitTaskRequest {
    pub subject_title: String,
    pub subject_type: SubjectType,
    #[serde(default)]
    pub additional_context: Option<String>,
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl From<SubmitTaskRequest> for TaskRequest {
    fn from(req: SubmitTaskRequest) -> Self {
        let mut out = TaskRequest::new(req.subject_title, req.subject_type);
        out.additional_context = req.additional_context;
        out.options = req.options;
        out
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitTaskResponse {
    pub task_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelTaskResponse {
    pub task_id: String,
    pub cancelled: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTasksQuery {
    /// Comma separated statuses.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListTasksResponse {
    pub count: usize,
    pub tasks: Vec<TaskSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub pipeline: String,
    pub shutting_down: bool,
    pub uptime_seconds: f64,
    pub requests_total: u64,
    pub errors_total: u64,
    pub tasks: RegistryStats,
}

#[derive(Debug)]
pub enum HttpServerError {
    InvalidRequest(String),
    NotFound(String),
    ShuttingDown,
    Store(String),
}

impl HttpServerError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::InvalidRequest(_) => (StatusCode::BAD_REQUEST, ErrorCode::ValidationError.as_str()),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::TaskNotFound.as_str()),
            Self::ShuttingDown => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::ShuttingDown.as_str(),
            ),
            Self::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::StoreError.as_str()),
        }
    }
}

impl From<OrchestratorError> for HttpServerError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Validation(e) => Self::InvalidRequest(e.to_string()),
            OrchestratorError::Store(e) => Self::Store(e.to_string()),
            OrchestratorError::ShuttingDown => Self::ShuttingDown,
        }
    }
}

impl IntoResponse for HttpServerError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.parts();
        let message = match self {
            Self::InvalidRequest(msg) | Self::Store(msg) => msg,
            Self::NotFound(task_id) => format!("task '{task_id}' not found"),
            Self::ShuttingDown => "server is shutting down".to_string(),
        };

        let body = serde_json::json!({
            "success": false,
            "error": message,
            "error_code": error_code,
        });

        (status, Json(body)).into_response()
    }
}
