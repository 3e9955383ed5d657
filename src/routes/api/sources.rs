use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use crate::error::AppError;
use crate::models::run::{PassStage, RunResult};
use crate::models::source::SourceDescriptor;
use crate::routes::AppState;
use crate::scheduler::ScheduledTask;

#[derive(Debug, Serialize)]
pub struct SourceView {
    #[serde(flatten)]
    pub source: SourceDescriptor,
    pub schedule: Option<ScheduledTask>,
    /// Stage of the pass in flight, if any.
    pub running: Option<PassStage>,
}

/// GET /api/v1/sources/{id}
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<SourceView>, AppError> {
    let runner = state.scheduler.runner();
    let source = runner
        .store()
        .get_source(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Source {id} not found")))?;

    let schedule = state
        .scheduler
        .tasks()
        .into_iter()
        .find(|t| t.source_id == id);
    let running = runner
        .running()
        .into_iter()
        .find(|p| p.source_id == id)
        .map(|p| p.stage);

    Ok(Json(SourceView {
        source,
        schedule,
        running,
    }))
}

/// POST /api/v1/sources/{id}/scrape
///
/// Run one pass now and return its result. Failures come back as a JSON
/// error with a remediation hint when one applies.
pub async fn trigger_scrape(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<RunResult>, AppError> {
    tracing::info!(source_id = id, "Manual scrape requested");
    let result = state.scheduler.runner().trigger(id).await?;
    Ok(Json(result))
}
