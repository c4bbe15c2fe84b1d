//! HTTP surface of the orchestration core.
//!
//! Submission plus task queries, result projections, diagnostics, and
//! health.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::adapters::sqlite::verify_connection;
use crate::application::SubmissionService;
use crate::domain::errors::CoreError;
use crate::domain::models::agent::AgentProgress;
use crate::domain::models::config::ServerConfig;
use crate::domain::models::task::{AnalysisMode, AnalysisTask, TaskStatus};
use crate::domain::ports::{Blackboard, TaskStore};

/// Request body for task submission.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub options: AnalyzeOptions,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeOptions {
    #[serde(default)]
    pub mode: Option<String>,
}

/// Pagination parameters for task listing.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

/// Format selector for the result endpoint.
#[derive(Debug, Deserialize)]
pub struct ResultParams {
    #[serde(default)]
    pub format: Option<String>,
}

/// Error envelope.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse { success: false, error: message.into() }),
    )
        .into_response()
}

fn internal_error(err: &CoreError) -> Response {
    match err {
        CoreError::Validation(msg) => error_response(StatusCode::BAD_REQUEST, msg.clone()),
        CoreError::TaskNotFound(id) => {
            error_response(StatusCode::NOT_FOUND, format!("task {id} not found"))
        }
        _ => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

/// Merged task view served by the query endpoints.
#[derive(Debug, Serialize)]
pub struct TaskView {
    pub task_id: String,
    pub query: String,
    pub mode: String,
    pub status: String,
    pub progress: u8,
    pub message: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
}

impl From<AnalysisTask> for TaskView {
    fn from(task: AnalysisTask) -> Self {
        let result_url = (task.status == TaskStatus::Completed)
            .then(|| format!("/task/{}/result", task.task_id));
        Self {
            result_url,
            message: task.status.message().to_string(),
            task_id: task.task_id,
            query: task.query,
            mode: task.mode.as_str().to_string(),
            status: task.status.as_str().to_string(),
            progress: task.progress,
            created_at: task.created_at.to_rfc3339(),
            updated_at: task.updated_at.to_rfc3339(),
            completed_at: task.completed_at.map(|dt| dt.to_rfc3339()),
            error_message: task.error_message,
        }
    }
}

/// Shared state behind the router.
pub struct ApiState {
    pub submission: SubmissionService,
    pub store: Arc<dyn TaskStore>,
    pub blackboard: Arc<dyn Blackboard>,
    pub pool: SqlitePool,
}

/// HTTP server for the orchestration core.
pub struct ApiServer {
    config: ServerConfig,
    state: Arc<ApiState>,
}

impl ApiServer {
    pub fn new(state: Arc<ApiState>, config: ServerConfig) -> Self {
        Self { config, state }
    }

    /// Build the router.
    pub fn build_router(&self) -> Router {
        let app = Router::new()
            .route("/analyze", post(analyze))
            .route("/task/{id}", get(get_task))
            .route("/task/{id}/progress", get(get_progress))
            .route("/task/{id}/result", get(get_result))
            .route("/task/{id}/phases", get(get_phases))
            .route("/tasks", get(list_tasks))
            .route("/health", get(health))
            .with_state(Arc::clone(&self.state));

        if self.config.enable_cors {
            app.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
                .layer(TraceLayer::new_for_http())
        } else {
            app.layer(TraceLayer::new_for_http())
        }
    }

    /// Start the server with a shutdown signal.
    pub async fn serve_with_shutdown<F>(
        self,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let router = self.build_router();

        tracing::info!("API server listening on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

// Handler functions

async fn analyze(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<AnalyzeRequest>,
) -> Response {
    let mode = match req.options.mode.as_deref() {
        None => AnalysisMode::Phased,
        Some(raw) => match AnalysisMode::from_str(raw) {
            Some(mode) => mode,
            None => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("unknown mode {raw:?}, expected phased or standard"),
                );
            }
        },
    };

    match state.submission.submit(&req.query, mode).await {
        Ok(task) => Json(json!({
            "success": true,
            "task_id": task.task_id,
            "status": task.status.as_str(),
            "mode": mode.as_str(),
            "message": "task submitted",
            "poll_url": format!("/task/{}", task.task_id),
        }))
        .into_response(),
        Err(err) => internal_error(&err),
    }
}

async fn get_task(State(state): State<Arc<ApiState>>, Path(id): Path<String>) -> Response {
    match state.store.get(&id).await {
        Ok(Some(task)) => Json(TaskView::from(task)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "task not found"),
        Err(err) => internal_error(&err),
    }
}

async fn get_progress(State(state): State<Arc<ApiState>>, Path(id): Path<String>) -> Response {
    let task = match state.store.get(&id).await {
        Ok(Some(task)) => task,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "task not found"),
        Err(err) => return internal_error(&err),
    };

    let agents: BTreeMap<String, AgentProgress> = match state.store.agent_progress(&id).await {
        Ok(agents) => agents
            .into_iter()
            .map(|(agent, progress)| (agent.as_str().to_string(), progress))
            .collect(),
        Err(err) => return internal_error(&err),
    };

    Json(json!({
        "success": true,
        "task_id": id,
        "status": task.status.as_str(),
        "overall_progress": task.progress,
        "agents": agents,
    }))
    .into_response()
}

async fn get_result(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Query(params): Query<ResultParams>,
) -> Response {
    let task = match state.store.get(&id).await {
        Ok(Some(task)) => task,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "task not found"),
        Err(err) => return internal_error(&err),
    };

    if task.status != TaskStatus::Completed {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": format!("task not completed, current status: {}", task.status.as_str()),
                "status": task.status.as_str(),
                "progress": task.progress,
            })),
        )
            .into_response();
    }

    let document = match state.store.result(&id).await {
        Ok(Some(document)) => document,
        Ok(None) => {
            return error_response(StatusCode::NOT_FOUND, "result not found or expired");
        }
        Err(err) => return internal_error(&err),
    };

    let format = params.format.as_deref().unwrap_or("json").to_lowercase();
    match format.as_str() {
        "json" => Json(json!({ "success": true, "data": document })).into_response(),
        "html" => (
            [
                (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("inline; filename=\"report_{id}.html\""),
                ),
            ],
            document.to_html(),
        )
            .into_response(),
        "md" => (
            [
                (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"report_{id}.md\""),
                ),
            ],
            document.to_markdown(),
        )
            .into_response(),
        "pdf" => error_response(
            StatusCode::NOT_IMPLEMENTED,
            "pdf output is not implemented, use json, html or md",
        ),
        other => error_response(
            StatusCode::BAD_REQUEST,
            format!("unsupported format {other:?}, expected json, html, md or pdf"),
        ),
    }
}

async fn get_phases(State(state): State<Arc<ApiState>>, Path(id): Path<String>) -> Response {
    match state.store.get(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "task not found"),
        Err(err) => return internal_error(&err),
    }

    match state.blackboard.task_summary(&id).await {
        Ok(summary) => Json(json!({
            "success": true,
            "task_id": id,
            "phases": summary.phases,
            "plans": summary.plans,
            "research": summary.research,
            "reports": summary.reports,
            "supplement_round": summary.supplement_round,
            "guidance": {
                "plan": summary.guidance_plan,
                "research": summary.guidance_research,
            },
            "forum_log": summary.forum_log,
        }))
        .into_response(),
        Err(err) => internal_error(&err),
    }
}

async fn list_tasks(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ListParams>,
) -> Response {
    let limit = params.limit.min(100);
    let tasks = match state.store.list(limit, params.offset).await {
        Ok(tasks) => tasks,
        Err(err) => return internal_error(&err),
    };
    let stats = match state.store.stats().await {
        Ok(stats) => stats,
        Err(err) => return internal_error(&err),
    };

    let views: Vec<TaskView> = tasks.into_iter().map(TaskView::from).collect();
    Json(json!({
        "success": true,
        "tasks": views,
        "total": stats.total,
        "stats": stats.counts,
    }))
    .into_response()
}

async fn health(State(state): State<Arc<ApiState>>) -> Response {
    let mut status = "healthy";
    let database = match verify_connection(&state.pool).await {
        Ok(()) => "healthy".to_string(),
        Err(err) => {
            status = "degraded";
            format!("unhealthy: {err}")
        }
    };

    let task_stats = state
        .store
        .stats()
        .await
        .map(|stats| json!({ "total": stats.total, "counts": stats.counts }))
        .unwrap_or_else(|_| json!({}));

    Json(json!({
        "status": status,
        "service": "triumvir",
        "components": { "database": database },
        "task_stats": task_stats,
    }))
    .into_response()
}
