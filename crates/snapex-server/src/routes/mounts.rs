//! Mount session inspection and reconciliation.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use snapex::MountSession;

use crate::error::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_mounts))
        .route("/reconcile", post(reconcile))
        .route("/:session_id/unmount", post(unmount))
}

#[derive(Debug, Deserialize)]
pub struct ReconcileParams {
    /// `false` hands the pass to the background scheduler.
    #[serde(default = "default_wait")]
    pub wait: bool,
}

fn default_wait() -> bool {
    true
}

/// GET /extraction/mounts
async fn list_mounts(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let sessions: Vec<MountSession> = state
        .reconciler
        .sessions()?
        .into_iter()
        .map(|session| session.as_ref().clone())
        .collect();
    Ok(Json(json!({ "sessions": sessions, "total": sessions.len() })))
}

/// POST /extraction/mounts/reconcile
async fn reconcile(
    State(state): State<AppState>,
    Query(params): Query<ReconcileParams>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if !params.wait {
        // No receiver only means the scheduler is not running.
        if state.reconcile_trigger.send(()).is_err() {
            tracing::warn!("Reconcile requested but no scheduler is listening");
        }
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "message": "Reconciliation scheduled" })),
        ));
    }

    let report = state.reconciler.reconcile().await?;
    Ok((StatusCode::OK, Json(json!(report))))
}

/// POST /extraction/mounts/:session_id/unmount
async fn unmount(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let released = state.reconciler.unmount(&session_id).await?;
    Ok(Json(json!({ "message": "Mount released", "session": released })))
}
