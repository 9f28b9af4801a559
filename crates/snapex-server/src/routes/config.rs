//! Static enumerations for populating client forms.

use axum::{routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Map, Value};

use snapex::classifier::SUPPORTED_FILE_TYPES;
use snapex::{ExtractionLevel, FileTypeFilter};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/levels", get(extraction_levels))
        .route("/file-filters", get(file_filters))
        .route("/file-types", get(file_types))
}

#[derive(Debug, Serialize)]
struct Choice {
    value: &'static str,
    label: &'static str,
    description: &'static str,
}

async fn extraction_levels() -> Json<Value> {
    let levels: Vec<Choice> = ExtractionLevel::ALL
        .iter()
        .map(|level| Choice {
            value: level.as_str(),
            label: level.label(),
            description: level.description(),
        })
        .collect();
    Json(json!({ "levels": levels }))
}

async fn file_filters() -> Json<Value> {
    let filters: Vec<Choice> = FileTypeFilter::ALL
        .iter()
        .map(|filter| Choice {
            value: filter.as_str(),
            label: filter.label(),
            description: filter.description(),
        })
        .collect();
    Json(json!({ "filters": filters }))
}

async fn file_types() -> Json<Value> {
    let categories: Map<String, Value> = SUPPORTED_FILE_TYPES
        .iter()
        .map(|(category, extensions)| ((*category).to_string(), json!(extensions)))
        .collect();
    Json(json!({ "file_types": categories }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::routes::test_support::TestApp;

    #[tokio::test]
    async fn test_enumerations() {
        let app = TestApp::new();

        let (status, levels) = app.get("/extraction/config/levels").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(levels["levels"].as_array().unwrap().len(), 4);
        assert_eq!(levels["levels"][0]["value"], "metadata_only");

        let (_, filters) = app.get("/extraction/config/file-filters").await;
        let values: Vec<&str> = filters["filters"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["value"].as_str().unwrap())
            .collect();
        assert!(values.contains(&"custom"));
        assert_eq!(values.len(), 6);

        let (_, types) = app.get("/extraction/config/file-types").await;
        assert!(types["file_types"]["logs"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!("log")));
    }
}
