//! Service wiring: event store, bus, dispatcher, read models and the realtime feed.

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use tokoledger_core::TenantId;
use tokoledger_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use tokoledger_infra::{
    command_dispatcher::CommandDispatcher, event_store::InMemoryEventStore, projections::Projections,
    workflows::Workflows,
};

use crate::config::ApiConfig;

pub type AppStore = Arc<InMemoryEventStore>;
pub type AppBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type AppWorkflows = Workflows<AppStore, AppBus>;

/// Realtime message broadcast via SSE.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub tenant_id: TenantId,
    pub topic: String,
    pub payload: JsonValue,
}

pub struct AppServices {
    workflows: AppWorkflows,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
    tax_bps: u32,
    store_name: String,
}

impl AppServices {
    pub fn workflows(&self) -> &AppWorkflows {
        &self.workflows
    }

    pub fn projections(&self) -> &Projections {
        self.workflows.projections()
    }

    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }

    pub fn tax_bps(&self) -> u32 {
        self.tax_bps
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }
}

pub fn build_services(config: &ApiConfig) -> AppServices {
    let store: AppStore = Arc::new(InMemoryEventStore::new());
    let bus: AppBus = Arc::new(InMemoryEventBus::new());

    // Realtime channel (SSE): lossy broadcast, tenant-filtered per subscriber.
    let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

    // Read models are folded inside the workflows; the bus only feeds SSE.
    spawn_realtime_feed(bus.subscribe(), realtime_tx.clone());

    let dispatcher = Arc::new(CommandDispatcher::new(store, bus));
    let workflows = Workflows::new(dispatcher, Arc::new(Projections::new()));

    AppServices {
        workflows,
        realtime_tx,
        tax_bps: config.tax_bps,
        store_name: config.store_name.clone(),
    }
}

/// Forward every published envelope as a `projection_updated` notification.
/// Ends once the bus is dropped.
fn spawn_realtime_feed(
    sub: Subscription<EventEnvelope<JsonValue>>,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
) {
    let spawned = std::thread::Builder::new()
        .name("realtime-feed".into())
        .spawn(move || {
            while let Ok(env) = sub.recv() {
                let at = env.aggregate_type();
                // Lossy: no receivers is not an error.
                let _ = realtime_tx.send(RealtimeMessage {
                    tenant_id: env.tenant_id(),
                    topic: format!("{at}.projection_updated"),
                    payload: serde_json::json!({
                        "kind": "projection_update",
                        "aggregate_type": at,
                        "aggregate_id": env.aggregate_id().to_string(),
                        "sequence_number": env.sequence_number(),
                    }),
                });
            }
            tracing::debug!("realtime feed stopped");
        });
    if let Err(e) = spawned {
        tracing::warn!("realtime feed not started: {e}");
    }
}

/// Build an SSE stream for a tenant (used by `/stream`).
pub fn tenant_sse_stream(
    services: Arc<AppServices>,
    tenant_id: TenantId,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(m) if m.tenant_id == tenant_id => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
