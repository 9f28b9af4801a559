use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use snapex::{Database, EngineConfig};

use crate::routes::create_router;
use crate::state::AppState;

pub const BACKUP_ID: &str = "backup-1";

/// Router over an in-memory database with one directory-backed backup.
pub struct TestApp {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let mount_dir = temp_dir.path().join("mount");
        std::fs::create_dir_all(&mount_dir).unwrap();

        let mut config = EngineConfig::default();
        config.output_directory = temp_dir.path().join("output");
        config.pipeline.progress_flush_every = 1;
        config
            .mounts
            .directories
            .insert(BACKUP_ID.to_string(), mount_dir);

        let state = AppState::bootstrap(&config, Database::open_in_memory().unwrap()).unwrap();
        let router = create_router(state.clone());
        Self {
            temp_dir,
            state,
            router,
        }
    }

    pub fn write_mount_file(&self, relative: &str, content: &str) {
        let path = self.temp_dir.path().join("mount").join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body)).await
    }
}
