use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use tokoledger_core::DomainError;
use tokoledger_infra::command_dispatcher::DispatchError;
use tokoledger_infra::workflows::WorkflowError;

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "concurrency_conflict", msg),
        DispatchError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DispatchError::Unauthorized => json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized"),
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DispatchError::TenantIsolation(msg) => json_error(StatusCode::FORBIDDEN, "tenant_isolation", msg),
        DispatchError::Deserialize(msg) => {
            tracing::error!("stored event cannot be decoded: {msg}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => {
            tracing::error!("event store failure: {e}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
        DispatchError::Publish(msg) => {
            tracing::error!("event bus failure: {msg}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "publish_error", msg)
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    dispatch_error_to_response(err.into())
}

pub fn workflow_error_to_response(err: WorkflowError) -> axum::response::Response {
    match err {
        WorkflowError::Dispatch(e) => dispatch_error_to_response(e),
        WorkflowError::Domain(e) => domain_error_to_response(e),
        WorkflowError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
        WorkflowError::InsufficientStock(shortages) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": format!("insufficient stock for {} product(s)", shortages.len()),
                "shortages": shortages,
            })),
        )
            .into_response(),
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn invalid_id(what: &'static str) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id"))
}

#[cfg(test)]
mod tests {
    use tokoledger_core::AggregateId;
    use tokoledger_infra::workflows::StockShortage;
    use tokoledger_inventory::ProductId;

    use super::*;

    #[test]
    fn status_mapping() {
        let status = |e: WorkflowError| workflow_error_to_response(e).status();
        assert_eq!(status(DomainError::validation("x").into()), StatusCode::BAD_REQUEST);
        assert_eq!(status(DomainError::invariant("x").into()), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status(DomainError::conflict("x").into()), StatusCode::CONFLICT);
        assert_eq!(status(DomainError::Unauthorized.into()), StatusCode::FORBIDDEN);
        assert_eq!(status(WorkflowError::NotFound("sale".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(WorkflowError::InsufficientStock(vec![StockShortage {
                product_id: ProductId::new(AggregateId::new()),
                product_name: "gula".into(),
                on_hand: 1,
                requested: 2,
            }])),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
