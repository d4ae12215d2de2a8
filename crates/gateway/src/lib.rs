//! # Huddle Gateway
//!
//! The small server-side surface of Huddle. Everything else talks to the
//! hosted backend directly; registration goes through here because it needs
//! the service API key.

mod docs;
mod error;
mod middleware;
mod state;

pub mod routes;

pub use docs::ApiDoc;
pub use error::{ApiError, ErrorResponse};
pub use state::AppState;

use axum::{
    http::header::{AUTHORIZATION, CONTENT_TYPE},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/register", post(routes::register::register))
        .route("/api-docs/openapi.json", get(openapi_document))
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::logging_middleware))
        .layer(cors_layer())
}

async fn openapi_document() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}
