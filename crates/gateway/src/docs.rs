use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::register::register
    ),
    components(
        schemas(
            crate::error::ErrorResponse,
            crate::routes::health::HealthResponse,
            crate::routes::register::RegisterRequest,
            crate::routes::register::RegisterResponse
        )
    ),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Accounts", description = "Member registration")
    )
)]
pub struct ApiDoc;
