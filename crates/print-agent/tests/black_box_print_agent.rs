use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokoledger_print_agent::app::{AgentState, build_app};
use tokoledger_print_agent::config::AgentConfig;
use tokoledger_print_agent::printer::{Printer, PrinterTarget};
use tokoledger_printing::Packet;

struct TestAgent {
    base_url: String,
    client: reqwest::Client,
    printer: Printer,
    handle: tokio::task::JoinHandle<()>,
}

impl TestAgent {
    async fn spawn(target: PrinterTarget) -> Self {
        let config = AgentConfig {
            target: target.clone(),
            ..AgentConfig::default()
        };
        let printer = Printer::new(target);
        let app = build_app(AgentState::new(&config, printer.clone()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            printer,
            handle,
        }
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }
}

impl Drop for TestAgent {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn receipt() -> Value {
    json!({
        "store_name": "Warung Sari",
        "receipt_no": "TRX-20261016-0A1B2C",
        "printed_at": chrono::Utc::now(),
        "items": [
            { "name": "Indomie goreng", "quantity": 2, "unit_price": 3_500, "total": 7_000 }
        ],
        "subtotal": 7_000,
        "total": 7_000,
        "payments": [{ "method": "Cash", "amount": 10_000 }],
        "change": 3_000,
    })
}

#[tokio::test]
async fn health_names_the_printer() {
    let agent = TestAgent::spawn(PrinterTarget::Memory).await;
    let res = agent.client.get(format!("{}/health", agent.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["printer"], "memory");
}

#[tokio::test]
async fn receipts_are_rendered_and_sent_to_the_printer() {
    let agent = TestAgent::spawn(PrinterTarget::Memory).await;

    let (status, body) = agent.post("/print", receipt()).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["ok"], true);

    let jobs = agent.printer.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(body["bytes"].as_u64().unwrap() as usize, jobs[0].len());
    assert_eq!(&jobs[0][..2], &[0x1B, 0x40]);
    let text = String::from_utf8_lossy(&jobs[0]);
    assert!(text.contains("Warung Sari"));
    assert!(text.contains("Rp7.000"));
}

#[tokio::test]
async fn invalid_receipts_are_rejected() {
    let agent = TestAgent::spawn(PrinterTarget::Memory).await;

    let (status, body) = agent.post("/print", json!({ "store_name": "x" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("invalid receipt"));

    let mut no_items = receipt();
    no_items["items"] = json!([]);
    let (status, _) = agent.post("/print", no_items).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(agent.printer.jobs().is_empty());
}

#[tokio::test]
async fn unreachable_printer_is_a_bad_gateway() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let agent = TestAgent::spawn(PrinterTarget::Tcp(addr.to_string())).await;

    let (status, body) = agent.post("/print", receipt()).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn file_targets_append_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spool.bin");
    let agent = TestAgent::spawn(PrinterTarget::File(path.clone())).await;

    let (status, first) = agent.post("/print", receipt()).await;
    assert_eq!(status, StatusCode::OK);
    agent.post("/print", receipt()).await;

    let written = std::fs::read(&path).unwrap();
    assert_eq!(written.len(), 2 * first["bytes"].as_u64().unwrap() as usize);
}

#[tokio::test]
async fn labels_become_niimbot_packets() {
    let agent = TestAgent::spawn(PrinterTarget::Memory).await;

    let rows: Vec<String> = [0x80u8, 0x00, 0x00, 0xFF]
        .iter()
        .map(|b| BASE64_STANDARD.encode([*b]))
        .collect();
    let (status, body) = agent
        .post("/label", json!({ "width": 8, "height": 4, "rows": rows, "density": 3 }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let packets: Vec<Packet> = body["packets"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| Packet::decode(&BASE64_STANDARD.decode(p.as_str().unwrap()).unwrap()).unwrap())
        .collect();
    assert_eq!(packets[0], Packet::set_density(3));
    assert_eq!(packets.last().unwrap(), &Packet::print_end());

    let (status, _) = agent
        .post("/label", json!({ "width": 8, "height": 2, "rows": rows }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = agent
        .post("/label", json!({ "width": 8, "height": 1, "rows": ["not base64!"] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
