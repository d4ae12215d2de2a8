use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use huddle_rowstore::views;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use utoipa::ToSchema;

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub ok: bool,
}

/// Creates a member with the participant role. The browser never sees the
/// service API key; it only reaches the backend through this route.
#[utoipa::path(
    post,
    path = "/api/register",
    tag = "Accounts",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Member created", body = RegisterResponse),
        (status = 400, description = "Missing email or password", body = crate::error::ErrorResponse),
        (status = 502, description = "Backend unreachable", body = crate::error::ErrorResponse),
        (status = 503, description = "Participant role not configured", body = crate::error::ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    let email = payload.email.trim();
    if email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("email and password are required"));
    }

    let role_id = state
        .participant_role_id()
        .ok_or_else(|| ApiError::service_unavailable("registration is not configured"))?;

    state
        .store()
        .insert(
            views::MEMBER_DEFAULT,
            json!({
                "email": email,
                "password": payload.password,
                "role": [role_id],
            }),
        )
        .await?;

    info!(email = %email, "Member registered");
    Ok(Json(RegisterResponse { ok: true }))
}
