use axum::{Router, routing::get};

pub mod common;
pub mod debts;
pub mod ledger;
pub mod products;
pub mod purchases;
pub mod sales;
pub mod shifts;
pub mod stock;
pub mod system;

/// Every authenticated route; `build_app` adds the auth layer and services.
pub fn router() -> Router {
    let outlets = stock::router()
        .merge(shifts::router())
        .merge(sales::checkout_router())
        .merge(purchases::router());

    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/stream", get(system::stream))
        .nest("/products", products::router())
        .nest("/outlets", outlets)
        .nest("/sales", sales::router())
        .nest("/debts", debts::router())
        .nest("/ledger", ledger::router())
}
