//! Checkout, sale history, receipts and voids.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;

use tokoledger_core::{AggregateId, OutletId};
use tokoledger_infra::projections::SaleFilter;
use tokoledger_infra::workflows::CheckoutInput;
use tokoledger_pos::SaleId;

use crate::app::dto::{CheckoutRequest, SalesQuery, VoidSaleRequest, receipt_for_sale};
use crate::app::errors::{domain_error_to_response, json_error, workflow_error_to_response};
use crate::app::routes::common::{CmdAuth, parse_id, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

/// Mounted under `/outlets`.
pub fn checkout_router() -> Router {
    Router::new().route("/:outlet/checkout", post(checkout))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_sales))
        .route("/:id", get(get_sale))
        .route("/:id/receipt", get(get_receipt))
        .route("/:id/void", post(void_sale))
}

async fn checkout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(outlet): Path<String>,
    Json(body): Json<CheckoutRequest>,
) -> Response {
    let body = match CmdAuth::new(body, "pos.checkout").authorize(&tenant, &principal) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let outlet_id = match parse_id::<OutletId>(&outlet, "outlet") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let input = CheckoutInput {
        outlet_id,
        cashier: principal.user_id(),
        items: body.items,
        order_discount: body.order_discount,
        tenders: body.tenders,
        customer: body.customer,
        due_date: body.due_date,
        receipt_no: body.receipt_no,
        allow_negative_stock: body.allow_negative_stock,
        tax_bps: services.tax_bps(),
        occurred_at: Utc::now(),
    };
    match services.workflows().checkout(tenant.tenant_id(), input) {
        Ok(outcome) => {
            let receipt = match receipt_for_sale(&outcome.sale, services.store_name()) {
                Ok(r) => r,
                Err(e) => return domain_error_to_response(e),
            };
            (
                StatusCode::CREATED,
                Json(serde_json::json!({
                    "sale": outcome.sale,
                    "debt_id": outcome.debt_id,
                    "journal": outcome.journal,
                    "warnings": outcome.warnings,
                    "receipt": receipt,
                })),
            )
                .into_response()
        }
        Err(e) => workflow_error_to_response(e),
    }
}

async fn list_sales(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<SalesQuery>,
) -> Response {
    if let Err(resp) = require(&tenant, &principal, "pos.sales.read") {
        return resp;
    }
    let filter = SaleFilter {
        outlet_id: query.outlet_id,
        from: query.from,
        to: query.to,
    };
    let sales = services.projections().sales.list(tenant.tenant_id(), &filter);
    (StatusCode::OK, Json(sales)).into_response()
}

async fn get_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = require(&tenant, &principal, "pos.sales.read") {
        return resp;
    }
    let id = match parse_id::<AggregateId>(&id, "sale") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.projections().sales.get(tenant.tenant_id(), id) {
        Some(view) => (StatusCode::OK, Json(view)).into_response(),
        None => json_error(StatusCode::NOT_FOUND, "not_found", "sale not found"),
    }
}

/// The print-agent payload for reprinting a sale.
async fn get_receipt(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = require(&tenant, &principal, "pos.sales.read") {
        return resp;
    }
    let id = match parse_id::<AggregateId>(&id, "sale") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.projections().sales.get(tenant.tenant_id(), id) {
        Some(view) => {
            let mut receipt = match receipt_for_sale(&view.document, services.store_name()) {
                Ok(r) => r,
                Err(e) => return domain_error_to_response(e),
            };
            receipt.open_drawer = false;
            (StatusCode::OK, Json(receipt)).into_response()
        }
        None => json_error(StatusCode::NOT_FOUND, "not_found", "sale not found"),
    }
}

async fn void_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<VoidSaleRequest>,
) -> Response {
    let body = match CmdAuth::new(body, "pos.sales.void").authorize(&tenant, &principal) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let sale_id = match parse_id::<AggregateId>(&id, "sale") {
        Ok(v) => SaleId::new(v),
        Err(resp) => return resp,
    };
    match services
        .workflows()
        .void_sale(tenant.tenant_id(), sale_id, &body.reason, Utc::now())
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}
