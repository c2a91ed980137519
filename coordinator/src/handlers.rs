use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use common::{
    ErrorCode, ImportRequest, ImportResponse, ImportResult, Status, TaskId, TaskInfo,
    TaskStateResponse,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ImportError;
use crate::manager::ImportManager;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ImportManager>,
    /// Se dispara al apagar el coordinador; corta los jobs a medio despachar
    pub shutdown: CancellationToken,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/import", post(import_job))
        .route("/api/v1/import/tasks", get(list_tasks))
        .route("/api/v1/import/tasks/report", post(report_task_state))
        .route("/api/v1/import/tasks/:id", get(get_task_state))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

// Siempre 200: si el request es inválido, el fallo va en `status`
async fn import_job(
    State(state): State<AppState>,
    Json(req): Json<Option<ImportRequest>>,
) -> Json<ImportResponse> {
    let resp = state.manager.import_job(&state.shutdown, req.as_ref()).await;
    info!(
        "job de importación procesado: {:?}, tareas={:?}",
        resp.status.error_code, resp.tasks
    );
    Json(resp)
}

async fn list_tasks(State(state): State<AppState>) -> Json<Vec<TaskInfo>> {
    Json(state.manager.list_tasks())
}

async fn get_task_state(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> Json<TaskStateResponse> {
    Json(state.manager.get_task_state(id))
}

// Reporte de un worker. Id desconocido -> 404
async fn report_task_state(
    State(state): State<AppState>,
    Json(report): Json<ImportResult>,
) -> Result<Json<Status>, (StatusCode, Json<Status>)> {
    match state.manager.update_task_state(&report) {
        Ok(()) => Ok(Json(Status::success())),
        Err(e @ ImportError::TaskNotFound(_)) => Err((
            StatusCode::NOT_FOUND,
            Json(Status::error(ErrorCode::TaskNotFound, e.to_string())),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Status::error(ErrorCode::UnexpectedError, e.to_string())),
        )),
    }
}
