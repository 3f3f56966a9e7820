use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::app::services::{AppServices, tenant_sse_stream};
use crate::context::{PrincipalContext, TenantContext};

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// Identity resolved from the bearer token.
pub async fn whoami(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "tenant_id": tenant.tenant_id(),
            "user_id": principal.user_id(),
            "roles": principal.roles(),
        })),
    )
        .into_response()
}

/// Server-sent projection updates for the caller's tenant.
pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> impl IntoResponse {
    tenant_sse_stream(services, tenant.tenant_id())
}
