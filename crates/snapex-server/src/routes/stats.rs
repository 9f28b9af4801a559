//! Aggregate views over the registry.

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/extraction/active-jobs", get(active_jobs))
        .route("/extraction/stats", get(stats))
}

/// GET /extraction/active-jobs
async fn active_jobs(State(state): State<AppState>) -> Json<Value> {
    let active = state.registry.active_jobs();
    Json(json!({ "active_jobs": active, "count": active.len() }))
}

/// GET /extraction/stats
async fn stats(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let jobs = state.registry.stats()?;
    let templates = state.templates.count()?;
    Ok(Json(json!({
        "total_jobs": jobs.total_jobs,
        "jobs_by_status": jobs.jobs_by_status,
        "active_jobs": jobs.active_jobs,
        "executions": jobs.executions,
        "total_templates": templates,
    })))
}
