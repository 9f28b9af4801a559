//! Health check route.

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use snapex::db::Location;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let db = state.registry.database();
    let (status, schema_version) = match db.schema_version() {
        Ok(version) => ("healthy", Some(version)),
        Err(e) => {
            tracing::warn!("Health check could not read the schema version: {}", e);
            ("degraded", None)
        }
    };
    let database = match db.location() {
        Location::File(path) => path.display().to_string(),
        Location::Memory => "memory".to_string(),
    };

    Json(json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "active_jobs": state.registry.active_jobs().len(),
        "database": database,
        "schema_version": schema_version,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::routes::test_support::TestApp;

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new();
        let (status, body) = app.get("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"], "memory");
        assert_eq!(body["schema_version"], 3);
    }
}
