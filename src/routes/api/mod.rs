pub mod scheduler;
pub mod sources;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};

use super::AppState;
use crate::auth::require_admin_token;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        // Sources
        .route("/sources/{id}", get(sources::get))
        .route("/sources/{id}/scrape", post(sources::trigger_scrape))
        // Scheduler
        .route("/scheduler/reconcile", post(scheduler::reconcile))
        .route("/scheduler/tasks", get(scheduler::tasks))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_token,
        ))
        .with_state(state);

    Router::new().nest("/api/v1", protected)
}
