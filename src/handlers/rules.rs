//! Rule handlers

use axum::{extract::{State, Path}, Json};
use serde_json::{json, Value};
use validator::Validate;

use crate::{AppState, AppResult, AppError};
use crate::models::{HttpRule, CreateRule, UpdateRule};

use super::{succeed, ApiJson};

/// List HTTP rules
pub async fn list(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let rules = HttpRule::list(&state.storage).await?;
    Ok(succeed(rules))
}

/// Get single rule
pub async fn get(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<Value>> {
    let rule = HttpRule::find_by_name(&state.storage, &name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Rule not found: {}", name)))?;

    Ok(succeed(rule))
}

/// Create new rule
pub async fn create(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateRule>,
) -> AppResult<Json<Value>> {
    req.validate()?;
    let rule = HttpRule::create(&state.storage, req).await?;
    Ok(succeed(rule))
}

/// Update rule, renaming it if a new name is given
pub async fn update(
    State(state): State<AppState>,
    Path(name): Path<String>,
    ApiJson(req): ApiJson<UpdateRule>,
) -> AppResult<Json<Value>> {
    req.validate()?;
    let rule = HttpRule::update(&state.storage, &name, req)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Rule not found: {}", name)))?;

    Ok(succeed(rule))
}

/// Delete rule. Its records are kept without a rule.
pub async fn delete(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<Value>> {
    if !HttpRule::delete(&state.storage, &name).await? {
        return Err(AppError::NotFound(format!("Rule not found: {}", name)));
    }

    tracing::info!("HTTP rule deleted: {}", name);
    Ok(succeed(json!({ "deleted": name })))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header::CONTENT_TYPE, Method, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::db::tests::memory_storage;
    use crate::{create_router, AppState};

    async fn app() -> Router {
        let state = AppState {
            storage: memory_storage().await,
            config: Config::default(),
        };
        create_router(state)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json");
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);

        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_rule_lifecycle() {
        let app = app().await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/rules/http",
            Some(json!({ "name": "ssrf", "flag_format": "[a-z]{6}", "notice": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["name"], "ssrf");
        assert_eq!(body["result"]["response_status_code"], "200");

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/rules/http",
            Some(json!({ "name": "ssrf", "flag_format": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            &app,
            Method::PUT,
            "/api/v1/rules/http/ssrf",
            Some(json!({ "name": "ssrf-v2", "rank": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["name"], "ssrf-v2");
        assert_eq!(body["result"]["rank"], 3);

        let (status, _) = send(&app, Method::GET, "/api/v1/rules/http/ssrf", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = send(&app, Method::GET, "/api/v1/rules/http", None).await;
        assert_eq!(body["result"].as_array().unwrap().len(), 1);

        let (status, _) = send(&app, Method::DELETE, "/api/v1/rules/http/ssrf-v2", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, Method::DELETE, "/api/v1/rules/http/ssrf-v2", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "failed");
    }

    #[tokio::test]
    async fn test_invalid_rule_is_rejected() {
        let app = app().await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/rules/http",
            Some(json!({ "name": "", "flag_format": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "failed");
    }

    #[tokio::test]
    async fn test_malformed_body_gets_failure_envelope() {
        let app = app().await;

        let (status, body) = send(&app, Method::POST, "/api/v1/rules/http", Some(json!({ "name": "x" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "failed");
        assert!(body["error"].as_str().unwrap().contains("flag_format"));
        assert!(body["result"].is_null());

        let request = Request::builder()
            .method(Method::PUT)
            .uri("/api/v1/rules/http/x")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{\"rank\": "))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "failed");
        assert!(body["result"].is_null());
    }
}
