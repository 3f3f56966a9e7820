//! Received purchases; the source of purchase postings for backfill.

use serde_json::Value as JsonValue;

use tokoledger_accounting::PostingSource;
use tokoledger_core::{AggregateId, OutletId, TenantId};
use tokoledger_events::EventEnvelope;
use tokoledger_inventory::{PurchaseDocument, PurchaseEvent, purchase::AGGREGATE_TYPE};

use crate::read_model::{InMemoryTenantStore, TenantStore};

use super::{ProjectionError, StreamCursors, decode};

#[derive(Debug)]
pub struct PurchasesProjection<S = InMemoryTenantStore<AggregateId, PurchaseDocument>> {
    store: S,
    cursors: StreamCursors,
}

impl Default for PurchasesProjection {
    fn default() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl<S> PurchasesProjection<S>
where
    S: TenantStore<AggregateId, PurchaseDocument>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, purchase_id: AggregateId) -> Option<PurchaseDocument> {
        self.store.get(tenant_id, &purchase_id)
    }

    /// Newest first.
    pub fn list(&self, tenant_id: TenantId, outlet_id: Option<OutletId>) -> Vec<PurchaseDocument> {
        let mut purchases: Vec<PurchaseDocument> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|p| outlet_id.is_none_or(|o| p.outlet_id == o))
            .collect();
        purchases.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        purchases
    }

    pub fn posting_sources(&self, tenant_id: TenantId) -> Vec<PostingSource> {
        let mut purchases = self.store.list(tenant_id);
        purchases.sort_by_key(|p| p.occurred_at);
        purchases
            .iter()
            .map(|p| PostingSource::Purchase(p.posting()))
            .collect()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }
        self.cursors.apply_once(envelope, || {
            let PurchaseEvent::PurchaseRecorded(e) = decode::<PurchaseEvent>(envelope)?;
            self.store.upsert(envelope.tenant_id(), envelope.aggregate_id(), e.document);
            Ok(())
        })
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        self.cursors.clear_tenant(tenant_id);
        self.store.clear_tenant(tenant_id);
    }
}
