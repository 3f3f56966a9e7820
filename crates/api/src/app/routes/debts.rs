//! Receivables and payables: listing, aging and payments.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;

use tokoledger_core::AggregateId;
use tokoledger_receivables::{DebtId, DebtKind};

use crate::app::dto::{AgingQuery, DebtsQuery, PaymentRequest};
use crate::app::errors::{json_error, workflow_error_to_response};
use crate::app::routes::common::{CmdAuth, parse_id, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_debts))
        .route("/aging", get(aging))
        .route("/:id", get(get_debt))
        .route("/:id/payments", post(record_payment))
}

async fn list_debts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<DebtsQuery>,
) -> Response {
    if let Err(resp) = require(&tenant, &principal, "debts.read") {
        return resp;
    }
    let debts = services.projections().debts.list(tenant.tenant_id(), query.kind);
    (StatusCode::OK, Json(debts)).into_response()
}

async fn aging(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<AgingQuery>,
) -> Response {
    if let Err(resp) = require(&tenant, &principal, "debts.read") {
        return resp;
    }
    let kind = query.kind.unwrap_or(DebtKind::Receivable);
    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let report = services.projections().debts.aging(tenant.tenant_id(), kind, as_of);
    (
        StatusCode::OK,
        Json(serde_json::json!({ "kind": kind, "as_of": as_of, "buckets": report })),
    )
        .into_response()
}

async fn get_debt(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = require(&tenant, &principal, "debts.read") {
        return resp;
    }
    let id = match parse_id::<AggregateId>(&id, "debt") {
        Ok(v) => DebtId::new(v),
        Err(resp) => return resp,
    };
    match services.projections().debts.get(tenant.tenant_id(), id) {
        Some(view) => (StatusCode::OK, Json(view)).into_response(),
        None => json_error(StatusCode::NOT_FOUND, "not_found", "debt not found"),
    }
}

async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<PaymentRequest>,
) -> Response {
    let body = match CmdAuth::new(body, "debts.pay").authorize(&tenant, &principal) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let id = match parse_id::<AggregateId>(&id, "debt") {
        Ok(v) => DebtId::new(v),
        Err(resp) => return resp,
    };
    match services
        .workflows()
        .pay_debt(tenant.tenant_id(), id, body.amount, body.fund, Utc::now())
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}
