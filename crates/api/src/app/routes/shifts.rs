//! Register shifts: open, drawer movements, close and history.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use uuid::Uuid;

use tokoledger_core::OutletId;

use crate::app::dto::{CashMovementRequest, CloseShiftRequest, OpenShiftRequest};
use crate::app::errors::workflow_error_to_response;
use crate::app::routes::common::{CmdAuth, parse_id, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/:outlet/shifts", post(open_shift).get(list_shifts))
        .route("/:outlet/shifts/current", get(current_shift))
        .route("/:outlet/shifts/:shift/cash", post(move_cash))
        .route("/:outlet/shifts/:shift/close", post(close_shift))
}

fn shift_ids(outlet: &str, shift: &str) -> Result<(OutletId, Uuid), Response> {
    Ok((parse_id(outlet, "outlet")?, parse_id(shift, "shift")?))
}

async fn open_shift(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(outlet): Path<String>,
    Json(body): Json<OpenShiftRequest>,
) -> Response {
    let body = match CmdAuth::new(body, "pos.shift.open").authorize(&tenant, &principal) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let outlet = match parse_id::<OutletId>(&outlet, "outlet") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.workflows().open_shift(
        tenant.tenant_id(),
        outlet,
        principal.user_id(),
        body.opening_cash,
        Utc::now(),
    ) {
        Ok(shift) => (StatusCode::CREATED, Json(shift)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

async fn current_shift(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(outlet): Path<String>,
) -> Response {
    if let Err(resp) = require(&tenant, &principal, "pos.shift.read") {
        return resp;
    }
    let outlet = match parse_id::<OutletId>(&outlet, "outlet") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.workflows().current_shift(tenant.tenant_id(), outlet) {
        Ok(shift) => {
            let expected_cash = shift.expected_cash();
            (
                StatusCode::OK,
                Json(serde_json::json!({ "shift": shift, "expected_cash": expected_cash })),
            )
                .into_response()
        }
        Err(e) => workflow_error_to_response(e),
    }
}

async fn list_shifts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(outlet): Path<String>,
) -> Response {
    if let Err(resp) = require(&tenant, &principal, "pos.shift.read") {
        return resp;
    }
    let outlet = match parse_id::<OutletId>(&outlet, "outlet") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let shifts = services.projections().shifts.for_outlet(tenant.tenant_id(), outlet);
    (StatusCode::OK, Json(shifts)).into_response()
}

async fn move_cash(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((outlet, shift)): Path<(String, String)>,
    Json(body): Json<CashMovementRequest>,
) -> Response {
    let body = match CmdAuth::new(body, "pos.shift.cash").authorize(&tenant, &principal) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let (outlet, shift_id) = match shift_ids(&outlet, &shift) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.workflows().move_cash(
        tenant.tenant_id(),
        outlet,
        shift_id,
        body.direction,
        body.amount,
        body.note,
        Utc::now(),
    ) {
        Ok(shift) => (StatusCode::OK, Json(shift)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

async fn close_shift(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((outlet, shift)): Path<(String, String)>,
    Json(body): Json<CloseShiftRequest>,
) -> Response {
    let body = match CmdAuth::new(body, "pos.shift.close").authorize(&tenant, &principal) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let (outlet, shift_id) = match shift_ids(&outlet, &shift) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.workflows().close_shift(
        tenant.tenant_id(),
        outlet,
        shift_id,
        body.counted_cash,
        body.note,
        Utc::now(),
    ) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}
