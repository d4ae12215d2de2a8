use std::sync::Arc;

use axum::{
    body::Body,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_METHOD, CONTENT_TYPE, ORIGIN,
        },
        Method, Request, StatusCode,
    },
    Router,
};
use http_body_util::BodyExt;
use huddle_gateway::{build_router, AppState};
use huddle_rowstore::{views, CallKind, MemoryStore, StoreCall};
use serde_json::{json, Value};
use tower::ServiceExt;

type TestResult<T = ()> = anyhow::Result<T>;

struct TestContext {
    store: MemoryStore,
    state: AppState,
}

impl TestContext {
    fn new() -> Self {
        Self::with_role(Some("role-participant"))
    }

    fn with_role(role: Option<&str>) -> Self {
        let store = MemoryStore::new();
        let state = AppState::new(Arc::new(store.clone()), role.map(str::to_string));
        Self { store, state }
    }

    fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    async fn post_register(&self, body: Value) -> TestResult<(StatusCode, Value)> {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/register")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?;
        let response = self.router().oneshot(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        Ok((status, serde_json::from_slice(&bytes)?))
    }
}

#[tokio::test]
async fn health_check_reports_ok() -> TestResult {
    let ctx = TestContext::new();
    let response = ctx
        .router()
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await?.to_bytes();
    let payload: Value = serde_json::from_slice(&body)?;
    assert_eq!(payload["status"], "ok");
    assert!(payload["timestamp"].is_string());
    Ok(())
}

#[tokio::test]
async fn register_inserts_member_with_participant_role() -> TestResult {
    let ctx = TestContext::new();
    let (status, payload) = ctx
        .post_register(json!({"email": "ada@example.com", "password": "secret"}))
        .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload, json!({"ok": true}));
    assert_eq!(
        ctx.store.calls_of(CallKind::Insert).await,
        vec![StoreCall::Insert {
            view: views::MEMBER_DEFAULT.to_string(),
            fields: json!({
                "email": "ada@example.com",
                "password": "secret",
                "role": ["role-participant"],
            }),
        }]
    );
    Ok(())
}

#[tokio::test]
async fn register_requires_email_and_password() -> TestResult {
    let ctx = TestContext::new();
    let (status, payload) = ctx.post_register(json!({"email": "ada@example.com"})).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(payload["error"].is_string());
    assert!(ctx.store.calls().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn register_rejects_malformed_json() -> TestResult {
    let ctx = TestContext::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/register")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))?;
    let response = ctx.router().oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn register_without_role_is_unavailable() -> TestResult {
    let ctx = TestContext::with_role(None);
    let (status, _) = ctx
        .post_register(json!({"email": "ada@example.com", "password": "secret"}))
        .await?;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(ctx.store.calls().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn upstream_errors_propagate_status() -> TestResult {
    let ctx = TestContext::new();
    ctx.store.fail_next(CallKind::Insert, 409).await;

    let (status, payload) = ctx
        .post_register(json!({"email": "ada@example.com", "password": "secret"}))
        .await?;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(payload["error"], "injected failure");
    Ok(())
}

#[tokio::test]
async fn openapi_document_lists_routes() -> TestResult {
    let ctx = TestContext::new();
    let response = ctx
        .router()
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await?.to_bytes();
    let document: Value = serde_json::from_slice(&body)?;
    assert!(document["paths"]["/api/register"]["post"].is_object());
    assert!(document["paths"]["/health"]["get"].is_object());
    Ok(())
}

#[tokio::test]
async fn cors_preflight_allows_any_origin() -> TestResult {
    let ctx = TestContext::new();
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/register")
        .header(ORIGIN, "http://localhost:3000")
        .header(ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())?;

    let response = ctx.router().oneshot(request).await?;
    let allow_origin = response
        .headers()
        .get(ACCESS_CONTROL_ALLOW_ORIGIN)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    assert_eq!(allow_origin, "*");
    Ok(())
}
