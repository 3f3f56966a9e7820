use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::Utc;

use tokoledger_core::AggregateId;
use tokoledger_infra::workflows::NewProduct;
use tokoledger_inventory::ProductId;

use crate::app::dto::{CreateProductRequest, ListProductsQuery, UpdatePricingRequest};
use crate::app::errors::{json_error, workflow_error_to_response};
use crate::app::routes::common::{CmdAuth, parse_id, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route("/:id", get(get_product))
        .route("/:id/pricing", put(update_pricing))
        .route("/:id/archive", post(archive_product))
}

fn product_id(raw: &str) -> Result<ProductId, Response> {
    parse_id::<AggregateId>(raw, "product").map(ProductId::new)
}

async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CreateProductRequest>,
) -> Response {
    let body = match CmdAuth::new(body, "products.write").authorize(&tenant, &principal) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let input = NewProduct {
        sku: body.sku,
        name: body.name,
        units: body.units,
        cost_price: body.cost_price,
    };
    match services.workflows().create_product(tenant.tenant_id(), input, Utc::now()) {
        Ok(id) => {
            let view = services.projections().products.get(tenant.tenant_id(), id);
            (
                StatusCode::CREATED,
                Json(serde_json::json!({ "id": id.to_string(), "product": view })),
            )
                .into_response()
        }
        Err(e) => workflow_error_to_response(e),
    }
}

async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ListProductsQuery>,
) -> Response {
    if let Err(resp) = require(&tenant, &principal, "products.read") {
        return resp;
    }
    let products = services
        .projections()
        .products
        .list(tenant.tenant_id(), query.include_archived);
    (StatusCode::OK, Json(products)).into_response()
}

async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = require(&tenant, &principal, "products.read") {
        return resp;
    }
    let id = match product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.projections().products.get(tenant.tenant_id(), id) {
        Some(view) => (StatusCode::OK, Json(view)).into_response(),
        None => json_error(StatusCode::NOT_FOUND, "not_found", "product not found"),
    }
}

async fn update_pricing(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<UpdatePricingRequest>,
) -> Response {
    let body = match CmdAuth::new(body, "products.write").authorize(&tenant, &principal) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let id = match product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services
        .workflows()
        .update_pricing(tenant.tenant_id(), id, body.units, body.cost_price, Utc::now())
    {
        Ok(()) => {
            let view = services.projections().products.get(tenant.tenant_id(), id);
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(e) => workflow_error_to_response(e),
    }
}

async fn archive_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = require(&tenant, &principal, "products.write") {
        return resp;
    }
    let id = match product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.workflows().archive_product(tenant.tenant_id(), id, Utc::now()) {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "id": id.to_string(), "status": "archived" }))).into_response(),
        Err(e) => workflow_error_to_response(e),
    }
}
