//! Template management routes.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use snapex::{Template, TemplateDraft};

use crate::error::ApiResult;
use crate::state::AppState;

/// Create the templates router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_templates).post(create_template))
        .route("/:id", get(get_template))
}

#[derive(Debug, Default, Deserialize)]
pub struct TemplateQuery {
    pub category: Option<String>,
}

/// GET /extraction/templates
async fn list_templates(
    State(state): State<AppState>,
    Query(query): Query<TemplateQuery>,
) -> ApiResult<Json<Value>> {
    let templates = state.templates.list(query.category.as_deref())?;
    Ok(Json(json!({ "templates": templates, "total": templates.len() })))
}

/// POST /extraction/templates
async fn create_template(
    State(state): State<AppState>,
    payload: Result<Json<TemplateDraft>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(draft) = payload?;
    let template = state.templates.create(draft)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Template created", "template": template })),
    ))
}

/// GET /extraction/templates/:id
async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Template>> {
    Ok(Json(state.templates.get(&id)?))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::routes::test_support::{TestApp, BACKUP_ID};

    #[tokio::test]
    async fn test_defaults_are_seeded_and_filterable() {
        let app = TestApp::new();

        let (status, body) = app.get("/extraction/templates").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 5);

        let (_, analytics) = app.get("/extraction/templates?category=analytics").await;
        let mut names: Vec<&str> = analytics["templates"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec!["Document Analysis", "File System Census"]);
    }

    #[tokio::test]
    async fn test_create_and_instantiate() {
        let app = TestApp::new();
        let (status, created) = app
            .post(
                "/extraction/templates",
                json!({
                    "name": "Weekly configs",
                    "category": "compliance",
                    "configuration": {
                        "extraction_level": "content_parsing",
                        "file_type_filter": "config_only",
                        "max_depth": 7
                    }
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let template_id = created["template"]["id"].as_str().unwrap().to_string();
        assert_eq!(created["template"]["usage_count"], 0);

        let (status, job) = app
            .post(
                "/extraction/jobs/from-template",
                json!({"template_id": template_id, "name": "configs-1", "backup_id": BACKUP_ID}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(job["job"]["file_type_filter"], "config_only");
        assert_eq!(job["job"]["max_depth"], 7);
        assert_eq!(job["job"]["status"], "pending");

        let (_, fetched) = app
            .get(&format!("/extraction/templates/{}", template_id))
            .await;
        assert_eq!(fetched["usage_count"], 1);
    }

    #[tokio::test]
    async fn test_duplicate_name_and_unknown_template() {
        let app = TestApp::new();
        let (status, _) = app
            .post("/extraction/templates", json!({"name": "Log Analysis"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app.get("/extraction/templates/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .post(
                "/extraction/jobs/from-template",
                json!({"template_id": "nope", "name": "x", "backup_id": BACKUP_ID}),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
