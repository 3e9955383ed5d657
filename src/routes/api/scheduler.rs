use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::error::AppError;
use crate::routes::AppState;
use crate::runner::RunningPass;
use crate::scheduler::{ReconcileReport, ScheduledTask};

#[derive(Debug, Serialize)]
pub struct TasksResponse {
    pub tasks: Vec<ScheduledTask>,
    pub running: Vec<RunningPass>,
}

/// POST /api/v1/scheduler/reconcile
pub async fn reconcile(State(state): State<AppState>) -> Result<Json<ReconcileReport>, AppError> {
    let report = state.scheduler.reconcile().await?;
    Ok(Json(report))
}

/// GET /api/v1/scheduler/tasks
pub async fn tasks(State(state): State<AppState>) -> Json<TasksResponse> {
    Json(TasksResponse {
        tasks: state.scheduler.tasks(),
        running: state.scheduler.runner().running(),
    })
}
