use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;

use tokoledger_core::OutletId;
use tokoledger_infra::workflows::PurchaseInput;

use crate::app::dto::PurchaseRequest;
use crate::app::errors::workflow_error_to_response;
use crate::app::routes::common::{CmdAuth, parse_id, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

/// Mounted under `/outlets`.
pub fn router() -> Router {
    Router::new().route("/:outlet/purchases", get(list_purchases).post(record_purchase))
}

/// Newest first.
async fn list_purchases(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(outlet): Path<String>,
) -> Response {
    if let Err(resp) = require(&tenant, &principal, "purchases.read") {
        return resp;
    }
    let outlet_id = match parse_id::<OutletId>(&outlet, "outlet") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let purchases = services.projections().purchases.list(tenant.tenant_id(), Some(outlet_id));
    (StatusCode::OK, Json(purchases)).into_response()
}

async fn record_purchase(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(outlet): Path<String>,
    Json(body): Json<PurchaseRequest>,
) -> Response {
    let body = match CmdAuth::new(body, "purchases.create").authorize(&tenant, &principal) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let outlet_id = match parse_id::<OutletId>(&outlet, "outlet") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let input = PurchaseInput {
        outlet_id,
        supplier: body.supplier,
        lines: body.lines,
        paid: body.paid,
        fund: body.fund,
        due_date: body.due_date,
        note: body.note,
        occurred_at: Utc::now(),
    };
    match services.workflows().purchase(tenant.tenant_id(), input) {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}
