//! Job lifecycle routes.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use snapex::{JobQuery, JobSpec};

use crate::error::ApiResult;
use crate::state::AppState;

/// Create the jobs router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs).post(create_job))
        .route("/from-template", post(create_from_template))
        .route("/:id", get(get_job).put(update_job).delete(delete_job))
        .route("/:id/execute", post(execute_job))
        .route("/:id/cancel", post(cancel_job))
        .route("/:id/executions", get(list_executions))
        .route("/:id/executions/:execution_id", get(get_execution))
}

/// Body of `POST /extraction/jobs/from-template`.
#[derive(Debug, Deserialize)]
pub struct FromTemplateRequest {
    pub template_id: String,
    pub name: String,
    pub backup_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// GET /extraction/jobs
async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> ApiResult<Json<Value>> {
    let (jobs, total) = state.registry.list(&query)?;
    Ok(Json(json!({
        "jobs": jobs,
        "total": total,
        "limit": query.limit,
        "offset": query.offset.unwrap_or(0),
    })))
}

/// POST /extraction/jobs
async fn create_job(
    State(state): State<AppState>,
    payload: Result<Json<JobSpec>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(spec) = payload?;
    let job = state.registry.create(spec)?;
    tracing::info!(job_id = %job.id, "Job created via API");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Extraction job created", "job": job })),
    ))
}

/// POST /extraction/jobs/from-template
async fn create_from_template(
    State(state): State<AppState>,
    payload: Result<Json<FromTemplateRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(request) = payload?;
    let spec = state.templates.instantiate(
        &request.template_id,
        &request.name,
        &request.backup_id,
        request.description,
        request.created_by,
    )?;
    let job = state.registry.create(spec)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Extraction job created from template", "job": job })),
    ))
}

/// GET /extraction/jobs/:id
async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let job = state.registry.get(&id)?;
    let runtime = job.runtime_seconds(Utc::now());
    Ok(Json(json!({
        "job": job,
        "is_running": state.registry.is_running(&id),
        "runtime": runtime,
    })))
}

/// PUT /extraction/jobs/:id
async fn update_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<JobSpec>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(spec) = payload?;
    let job = state.registry.update(&id, spec)?;
    Ok(Json(json!({ "message": "Extraction job updated", "job": job })))
}

/// DELETE /extraction/jobs/:id
async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.registry.delete(&id)?;
    Ok(Json(json!({ "message": "Extraction job deleted", "id": id })))
}

/// POST /extraction/jobs/:id/execute
///
/// Accepts the job and returns immediately; progress is observed by polling.
async fn execute_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let job = state.runner.start(&id)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "Extraction job started", "job": job })),
    ))
}

/// POST /extraction/jobs/:id/cancel
async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let job = state.registry.request_cancel(&id)?;
    let message = if job.status.is_terminal() {
        "Extraction job cancelled"
    } else {
        "Cancellation requested"
    };
    Ok(Json(json!({ "message": message, "job": job })))
}

/// GET /extraction/jobs/:id/executions
async fn list_executions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let executions = state.registry.executions(&id)?;
    Ok(Json(json!({ "executions": executions, "total": executions.len() })))
}

/// GET /extraction/jobs/:id/executions/:execution_id
async fn get_execution(
    State(state): State<AppState>,
    Path((id, execution_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let execution = state.registry.execution(&id, &execution_id)?;
    Ok(Json(json!({ "execution": execution })))
}
