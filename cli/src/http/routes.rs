use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use taleforge_core::api::{TaskFilter, TaskSnapshot, TaskStatus};

use crate::http::{models::*, state::AppState};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/tasks", post(submit_handler).get(list_handler))
        .route("/api/v1/tasks/:task_id", get(status_handler))
        .route("/api/v1/tasks/:task_id/cancel", post(cancel_handler))
        .route("/api/v1/shutdown", post(shutdown_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// POST /api/v1/tasks
async fn submit_handler(
    State(state): State<AppState>,
    Json(req): Json<SubmitTaskRequest>,
) -> Result<(StatusCode, Json<SubmitTaskResponse>), HttpServerError> {
    state.record_request("/api/v1/tasks:submit");

    match state.orchestrator.submit(req.into()).await {
        Ok(task_id) => Ok((StatusCode::ACCEPTED, Json(SubmitTaskResponse { task_id }))),
        Err(e) => {
            state.record_error();
            Err(e.into())
        }
    }
}

/// GET /api/v1/tasks/{id}
async fn status_handler(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskSnapshot>, HttpServerError> {
    state.record_request("/api/v1/tasks:status");

    match state.orchestrator.get_status(&task_id).await {
        Ok(Some(snapshot)) => Ok(Json(snapshot)),
        Ok(None) => Err(HttpServerError::NotFound(task_id)),
        Err(e) => {
            state.record_error();
            Err(e.into())
        }
    }
}

/// POST /api/v1/tasks/{id}/cancel
///
/// `cancelled: false` for unknown or already finished tasks.
async fn cancel_handler(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<CancelTaskResponse>, HttpServerError> {
    state.record_request("/api/v1/tasks:cancel");

    match state.orchestrator.cancel(&task_id).await {
        Ok(cancelled) => Ok(Json(CancelTaskResponse { task_id, cancelled })),
        Err(e) => {
            state.record_error();
            Err(e.into())
        }
    }
}

/// GET /api/v1/tasks?status=completed,failed&limit=20
async fn list_handler(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<ListTasksResponse>, HttpServerError> {
    state.record_request("/api/v1/tasks:list");

    let status = match query.status.as_deref().map(parse_statuses).transpose() {
        Ok(status) => status,
        Err(msg) => {
            state.record_error();
            return Err(HttpServerError::InvalidRequest(msg));
        }
    };
    let filter = TaskFilter {
        status,
        subject_type: None,
        limit: query.limit,
    };

    match state.orchestrator.list(&filter).await {
        Ok(tasks) => Ok(Json(ListTasksResponse {
            count: tasks.len(),
            tasks,
        })),
        Err(e) => {
            state.record_error();
            Err(e.into())
        }
    }
}

fn parse_statuses(raw: &str) -> Result<Vec<TaskStatus>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    state.record_request("/health");

    let tasks = state.orchestrator.stats().await;
    let stats = state.stats.read().unwrap_or_else(|e| e.into_inner());
    Json(HealthResponse {
        status: "ok",
        pipeline: state.orchestrator.pipeline_name().to_string(),
        shutting_down: state.orchestrator.is_shutting_down(),
        uptime_seconds: stats.uptime_seconds(),
        requests_total: stats.requests_total,
        errors_total: stats.errors_total,
        tasks,
    })
}

/// POST /api/v1/shutdown
async fn shutdown_handler(State(state): State<AppState>) -> StatusCode {
    state.record_request("/api/v1/shutdown");
    tracing::info!("shutdown requested over HTTP");
    let _ = state.shutdown_tx.send(());
    StatusCode::ACCEPTED
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use taleforge_core::api::{GenerationConfig, InMemoryTaskStore, Orchestrator, RunnerSettings};
    use taleforge_plugins::factory::{build_generator, build_standard_pipeline};
    use tokio::sync::broadcast;
    use tower::ServiceExt;

    fn test_router() -> (Router, AppState) {
        let cfg = GenerationConfig::default();
        let pipeline = build_standard_pipeline(build_generator(&cfg).unwrap(), &cfg).unwrap();
        let orch = Orchestrator::new(
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(pipeline),
            RunnerSettings::default(),
            64,
        );
        let (shutdown_tx, _) = broadcast::channel(1);
        let state = AppState::new(orch, shutdown_tx);
        (create_router(state.clone()), state)
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn submit_returns_accepted_with_task_id() {
        let (router, state) = test_router();
        let (status, body) = send(
            &router,
            post_json(
                "/api/v1/tasks",
                json!({ "subject_title": "Alpha", "subject_type": "world" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let task_id = body["task_id"].as_str().unwrap().to_string();

        let (status, body) = send(&router, get(&format!("/api/v1/tasks/{task_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["task_id"], json!(task_id));

        let done = state.orchestrator.wait(&task_id).await.unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn invalid_submit_is_bad_request() {
        let (router, _) = test_router();
        let (status, body) = send(
            &router,
            post_json(
                "/api/v1/tasks",
                json!({ "subject_title": "  ", "subject_type": "item" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_code"], "validation_error");
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let (router, _) = test_router();
        let (status, body) = send(&router, get("/api/v1/tasks/does-not-exist")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error_code"], "task_not_found");

        let (status, body) = send(
            &router,
            post_json("/api/v1/tasks/does-not-exist/cancel", json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cancelled"], false);
    }

    #[tokio::test]
    async fn cancel_then_list_by_status() {
        let (router, state) = test_router();
        let task_id = state
            .orchestrator
            .submit(taleforge_core::api::TaskRequest::new(
                "Beta",
                taleforge_core::api::SubjectType::Faction,
            ))
            .await
            .unwrap();

        let (status, body) = send(
            &router,
            post_json(&format!("/api/v1/tasks/{task_id}/cancel"), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cancelled"], true);
        state.orchestrator.wait(&task_id).await.unwrap();

        let (status, body) = send(&router, get("/api/v1/tasks?status=cancelled")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["tasks"][0]["status"], "cancelled");

        let (status, _) = send(&router, get("/api/v1/tasks?status=bogus")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_pipeline_and_counters() {
        let (router, _) = test_router();
        send(&router, get("/api/v1/tasks/x")).await;
        let (status, body) = send(&router, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["pipeline"], "standard-content");
        assert_eq!(body["requests_total"], 2);
        assert_eq!(body["tasks"]["pending"], 0);
    }
}
