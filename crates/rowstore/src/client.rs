//! HTTP client for the hosted row store.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use huddle_config::BackendConfig;
use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::query::{ListQuery, Page, Row, Upload};
use crate::store::RowStore;

const API_KEY_HEADER: &str = "x-api-key";

/// Callback run for every failed call, before the error is returned.
pub type ErrorHook = Arc<dyn Fn(&StoreError) + Send + Sync>;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct AuthenticateResponse {
    token: String,
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Clone)]
pub struct RowStoreClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    token: Arc<RwLock<Option<String>>>,
    on_error: Option<ErrorHook>,
}

impl std::fmt::Debug for RowStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStoreClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("has_token", &self.token().is_some())
            .finish()
    }
}

impl RowStoreClient {
    pub fn new(config: &BackendConfig) -> StoreResult<Self> {
        let http = Client::builder().timeout(config.request_timeout()).build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: None,
            token: Arc::new(RwLock::new(None)),
            on_error: None,
        })
    }

    /// Sends the service key on every request. Only the register route needs this.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_token(self, token: Option<String>) -> Self {
        self.set_token(token);
        self
    }

    pub fn with_error_hook(mut self, hook: ErrorHook) -> Self {
        self.on_error = Some(hook);
        self
    }

    /// Replaces the bearer token used by subsequent calls.
    pub fn set_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = token;
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|guard| guard.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let mut request = request;
        if let Some(token) = self.token() {
            request = request.bearer_auth(token);
        }
        if let Some(api_key) = &self.api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }
        request
    }

    async fn send(&self, request: RequestBuilder) -> StoreResult<Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let upstream: UpstreamError = serde_json::from_str(&body).unwrap_or_default();
        let message = upstream
            .message
            .or(upstream.error)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

        Err(StoreError::from_status(status.as_u16(), message))
    }

    /// Runs the error hook on failure and passes the result through.
    fn observe<T>(&self, operation: &'static str, result: StoreResult<T>) -> StoreResult<T> {
        if let Err(err) = &result {
            if err.is_unauthorized() {
                debug!(operation, "row store rejected session token");
            } else {
                warn!(operation, error = %err, "row store call failed");
            }
            if let Some(hook) = &self.on_error {
                hook(err);
            }
        }
        result
    }

    async fn list_inner(&self, view: &str, query: &ListQuery) -> StoreResult<Page> {
        let request = self
            .http
            .get(self.url(&format!("{view}/rows")))
            .query(&query.to_params());
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get_inner(&self, view: &str, id: &str) -> StoreResult<Option<Row>> {
        let request = self.http.get(self.url(&format!("{view}/rows/{id}")));
        match self.send(request).await {
            Ok(response) => {
                let bytes = response.bytes().await?;
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            Err(StoreError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn insert_inner(&self, view: &str, fields: Row) -> StoreResult<Row> {
        let request = self
            .http
            .post(self.url(&format!("{view}/rows")))
            .json(&fields);
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        let created: Row = serde_json::from_slice(&bytes)?;
        if created.get("id").and_then(|id| id.as_str()).is_none() {
            return Err(StoreError::invalid_row("created row has no id"));
        }
        Ok(created)
    }

    async fn add_relation_inner(&self, view: &str, id: &str, relations: Row) -> StoreResult<()> {
        let request = self
            .http
            .post(self.url(&format!("{view}/rows/{id}/relations")))
            .json(&relations);
        self.send(request).await?;
        Ok(())
    }

    async fn upload_inner(&self, view: &str, file: Upload) -> StoreResult<String> {
        let part = multipart::Part::bytes(file.bytes.to_vec())
            .file_name(file.file_name)
            .mime_str(&file.content_type)?;
        let form = multipart::Form::new().part("file", part);
        let request = self
            .http
            .post(self.url(&format!("{view}/upload")))
            .multipart(form);
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        let parsed: UploadResponse = serde_json::from_slice(&bytes)?;
        Ok(parsed.url)
    }

    async fn authenticate_inner(&self, email: &str, password: &str) -> StoreResult<String> {
        let request = self
            .http
            .post(self.url("authenticate"))
            .json(&json!({ "identifier": email, "password": password }));
        let response = self.send(request).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Err(StoreError::invalid_row("authentication returned no token"));
        }
        let bytes = response.bytes().await?;
        let parsed: AuthenticateResponse = serde_json::from_slice(&bytes)?;
        Ok(parsed.token)
    }
}

#[async_trait]
impl RowStore for RowStoreClient {
    async fn list(&self, view: &str, query: &ListQuery) -> StoreResult<Page> {
        let result = self.list_inner(view, query).await;
        self.observe("list", result)
    }

    async fn get(&self, view: &str, id: &str) -> StoreResult<Option<Row>> {
        let result = self.get_inner(view, id).await;
        self.observe("get", result)
    }

    async fn insert(&self, view: &str, fields: Row) -> StoreResult<Row> {
        let result = self.insert_inner(view, fields).await;
        self.observe("insert", result)
    }

    async fn add_relation(&self, view: &str, id: &str, relations: Row) -> StoreResult<()> {
        let result = self.add_relation_inner(view, id, relations).await;
        self.observe("add_relation", result)
    }

    async fn upload(&self, view: &str, file: Upload) -> StoreResult<String> {
        let result = self.upload_inner(view, file).await;
        self.observe("upload", result)
    }

    async fn authenticate(&self, email: &str, password: &str) -> StoreResult<String> {
        let result = self.authenticate_inner(email, password).await;
        self.observe("authenticate", result)
    }
}
