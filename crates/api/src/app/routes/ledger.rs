//! Chart of accounts, journal entries, balances and the backfill.

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

use tokoledger_accounting::Account;
use tokoledger_infra::workflows::{ExpenseInput, ManualEntry};

use crate::app::dto::{ExpenseRequest, OpenAccountRequest, PostJournalRequest, parse_account_kind};
use crate::app::errors::workflow_error_to_response;
use crate::app::routes::common::{CmdAuth, parse_id, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/accounts/init", post(init_chart))
        .route("/accounts", post(open_account).get(list_accounts))
        .route("/journal", post(post_journal_entry))
        .route("/journal/:id/reverse", post(reverse_journal_entry))
        .route("/expenses", post(record_expense))
        .route("/balances", get(list_balances))
        .route("/trial-balance", get(trial_balance))
        .route("/backfill", post(backfill))
}

async fn init_chart(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = require(&tenant, &principal, "ledger.accounts") {
        return resp;
    }
    match services.workflows().initialize_chart(tenant.tenant_id(), Utc::now()) {
        Ok(opened) => (StatusCode::OK, Json(serde_json::json!({ "opened": opened }))).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

async fn open_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<OpenAccountRequest>,
) -> Response {
    let body = match CmdAuth::new(body, "ledger.accounts").authorize(&tenant, &principal) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let kind = match parse_account_kind(&body.kind) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let account = Account::new(body.code, body.name, kind);
    match services
        .workflows()
        .open_account(tenant.tenant_id(), account.clone(), Utc::now())
    {
        Ok(()) => (StatusCode::CREATED, Json(account)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

async fn list_accounts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = require(&tenant, &principal, "ledger.read") {
        return resp;
    }
    match services.workflows().accounts(tenant.tenant_id()) {
        Ok(accounts) => (StatusCode::OK, Json(accounts)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

async fn post_journal_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<PostJournalRequest>,
) -> Response {
    let body = match CmdAuth::new(body, "ledger.post").authorize(&tenant, &principal) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let entry = ManualEntry {
        reference: body.reference,
        lines: body.lines,
        description: body.description,
        occurred_at: body.occurred_at.unwrap_or_else(Utc::now),
    };
    match services.workflows().post_manual(tenant.tenant_id(), entry) {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

async fn reverse_journal_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = require(&tenant, &principal, "ledger.post") {
        return resp;
    }
    let entry_id = match parse_id::<Uuid>(&id, "journal entry") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services
        .workflows()
        .reverse_entry(tenant.tenant_id(), entry_id, Utc::now())
    {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

async fn record_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ExpenseRequest>,
) -> Response {
    let body = match CmdAuth::new(body, "ledger.post").authorize(&tenant, &principal) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let input = ExpenseInput {
        account: body.account,
        fund: body.fund,
        amount: body.amount,
        description: body.description,
        occurred_at: body.occurred_at.unwrap_or_else(Utc::now),
    };
    match services.workflows().record_expense(tenant.tenant_id(), input) {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}

async fn list_balances(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = require(&tenant, &principal, "ledger.read") {
        return resp;
    }
    let tb = services.projections().ledger.trial_balance(tenant.tenant_id());
    let rows: Vec<serde_json::Value> = tb
        .rows()
        .map(|row| {
            serde_json::json!({
                "code": row.code,
                "name": row.name,
                "kind": row.kind,
                "debits": row.debits,
                "credits": row.credits,
                "balance": row.balance(),
            })
        })
        .collect();
    (StatusCode::OK, Json(rows)).into_response()
}

async fn trial_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = require(&tenant, &principal, "ledger.read") {
        return resp;
    }
    let tb = services.projections().ledger.trial_balance(tenant.tenant_id());
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "total_debits": tb.total_debits(),
            "total_credits": tb.total_credits(),
            "balanced": tb.is_balanced(),
            "net_income": tb.net_income(),
            "accounts": tb,
        })),
    )
        .into_response()
}

async fn backfill(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = require(&tenant, &principal, "ledger.backfill") {
        return resp;
    }
    match services.workflows().backfill(tenant.tenant_id(), Utc::now()) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}
