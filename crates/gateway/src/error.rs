use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use huddle_rowstore::StoreError;
use serde::Serialize;
use tracing::{error, warn};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Upstream failures keep the upstream status; anything that never got a
/// usable answer from the backend is a bad gateway.
impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        let upstream = error
            .status()
            .and_then(|status| StatusCode::from_u16(status).ok());
        match (upstream, &error) {
            (Some(status), StoreError::Http { message, .. }) => {
                warn!(status = %status, message = %message, "upstream rejected request");
                Self::new(status, message.clone())
            }
            (Some(status), _) => {
                warn!(status = %status, error = %error, "upstream rejected request");
                Self::new(status, error.to_string())
            }
            (None, _) => {
                error!(error = ?error, "upstream unreachable");
                Self::bad_gateway(error.to_string())
            }
        }
    }
}
