//! HTTP surface of the print agent.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use tokoledger_printing::{LabelBitmap, MoneyFormat, Receipt, label_job, render};

use crate::config::AgentConfig;
use crate::printer::Printer;

#[derive(Debug, Clone)]
pub struct AgentState {
    printer: Printer,
    paper_mm: u32,
    money: MoneyFormat,
}

impl AgentState {
    pub fn new(config: &AgentConfig, printer: Printer) -> Self {
        Self {
            printer,
            paper_mm: config.paper_mm,
            money: MoneyFormat::new(config.currency.clone()),
        }
    }

    pub fn printer(&self) -> &Printer {
        &self.printer
    }
}

#[derive(Debug, Deserialize)]
pub struct LabelRequest {
    pub width: u16,
    pub height: u16,
    /// One base64 string per pixel row, `ceil(width / 8)` bytes each.
    pub rows: Vec<String>,
    #[serde(default = "default_density")]
    pub density: u8,
    #[serde(default = "default_label_type")]
    pub label_type: u8,
    #[serde(default = "default_copies")]
    pub copies: u16,
}

fn default_density() -> u8 {
    3
}

fn default_label_type() -> u8 {
    1
}

fn default_copies() -> u16 {
    1
}

pub fn build_app(state: AgentState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/print", post(print_receipt))
        .route("/label", post(encode_label))
        .with_state(Arc::new(state))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
}

fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message.into() }))).into_response()
}

async fn health(State(state): State<Arc<AgentState>>) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "printer": state.printer.target().to_string() })),
    )
        .into_response()
}

async fn print_receipt(State(state): State<Arc<AgentState>>, body: Bytes) -> Response {
    let mut receipt: Receipt = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return bad_request(format!("invalid receipt: {e}")),
    };
    receipt.paper_mm = state.paper_mm;

    let bytes = match render(&receipt, &state.money) {
        Ok(b) => b,
        Err(e) => return bad_request(e.to_string()),
    };

    match state.printer.write(&bytes).await {
        Ok(()) => {
            info!(receipt_no = %receipt.receipt_no, bytes = bytes.len(), "receipt printed");
            (StatusCode::OK, Json(json!({ "ok": true, "bytes": bytes.len() }))).into_response()
        }
        Err(e) => {
            warn!(receipt_no = %receipt.receipt_no, "print failed: {e}");
            (StatusCode::BAD_GATEWAY, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

async fn encode_label(body: Bytes) -> Response {
    let req: LabelRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return bad_request(format!("invalid label: {e}")),
    };
    if req.rows.len() != req.height as usize {
        return bad_request(format!("height is {} but {} rows were sent", req.height, req.rows.len()));
    }

    let mut rows = Vec::with_capacity(req.rows.len());
    for (i, row) in req.rows.iter().enumerate() {
        match BASE64_STANDARD.decode(row) {
            Ok(bytes) => rows.push(bytes),
            Err(e) => return bad_request(format!("row {i} is not base64: {e}")),
        }
    }

    let packets = LabelBitmap::from_rows(req.width, rows)
        .and_then(|bitmap| label_job(&bitmap, req.density, req.label_type, req.copies));
    match packets {
        Ok(packets) => {
            let encoded: Vec<String> = packets.iter().map(|p| BASE64_STANDARD.encode(p.encode())).collect();
            (StatusCode::OK, Json(json!({ "packets": encoded }))).into_response()
        }
        Err(e) => bad_request(e.to_string()),
    }
}
