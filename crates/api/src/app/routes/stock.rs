//! Per-outlet stock: levels, manual adjustments and physical counts.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;

use tokoledger_core::{AggregateId, OutletId};
use tokoledger_infra::workflows::StockAdjustment;
use tokoledger_inventory::ProductId;

use crate::app::dto::CountStockRequest;
use crate::app::errors::workflow_error_to_response;
use crate::app::routes::common::{CmdAuth, parse_id, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/:outlet/stock", get(list_stock))
        .route("/:outlet/stock/:product/adjust", post(adjust_stock))
        .route("/:outlet/stock/:product/count", post(count_stock))
}

fn ids(outlet: &str, product: &str) -> Result<(OutletId, ProductId), Response> {
    let outlet = parse_id::<OutletId>(outlet, "outlet")?;
    let product = parse_id::<AggregateId>(product, "product").map(ProductId::new)?;
    Ok((outlet, product))
}

async fn list_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(outlet): Path<String>,
) -> Response {
    if let Err(resp) = require(&tenant, &principal, "stock.read") {
        return resp;
    }
    let outlet = match parse_id::<OutletId>(&outlet, "outlet") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let levels = services.projections().stock.for_outlet(tenant.tenant_id(), outlet);
    (StatusCode::OK, Json(levels)).into_response()
}

async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((outlet, product)): Path<(String, String)>,
    Json(body): Json<StockAdjustment>,
) -> Response {
    let body = match CmdAuth::new(body, "stock.adjust").authorize(&tenant, &principal) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let (outlet, product) = match ids(&outlet, &product) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services
        .workflows()
        .adjust_stock(tenant.tenant_id(), product, outlet, body, Utc::now())
    {
        Ok(level) => (StatusCode::OK, Json(level)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

async fn count_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((outlet, product)): Path<(String, String)>,
    Json(body): Json<CountStockRequest>,
) -> Response {
    let body = match CmdAuth::new(body, "stock.count").authorize(&tenant, &principal) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let (outlet, product) = match ids(&outlet, &product) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services
        .workflows()
        .count_stock(tenant.tenant_id(), product, outlet, body.counted, Utc::now())
    {
        Ok(level) => (StatusCode::OK, Json(level)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}
