//! Sales journal read model, also the source of sale postings for backfill.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use tokoledger_accounting::PostingSource;
use tokoledger_core::{AggregateId, OutletId, TenantId};
use tokoledger_events::EventEnvelope;
use tokoledger_pos::{SaleDocument, SaleEvent, SaleStatus, sale::AGGREGATE_TYPE};

use crate::read_model::{InMemoryTenantStore, TenantStore};

use super::{ProjectionError, StreamCursors, decode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleView {
    #[serde(flatten)]
    pub document: SaleDocument,
    pub status: SaleStatus,
    pub void_reason: Option<String>,
    pub voided_at: Option<DateTime<Utc>>,
}

impl SaleView {
    /// The sale posting, plus its reversal once voided.
    pub fn posting_sources(&self) -> Vec<PostingSource> {
        let posting = self.document.posting();
        match self.status {
            SaleStatus::Completed => vec![PostingSource::Sale(posting)],
            SaleStatus::Voided => {
                let mut void = posting.clone();
                if let Some(at) = self.voided_at {
                    void.occurred_at = at;
                }
                vec![PostingSource::Sale(posting), PostingSource::SaleVoid(void)]
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaleFilter {
    pub outlet_id: Option<OutletId>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct SalesProjection<S = InMemoryTenantStore<AggregateId, SaleView>> {
    store: S,
    cursors: StreamCursors,
}

impl Default for SalesProjection {
    fn default() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl<S> SalesProjection<S>
where
    S: TenantStore<AggregateId, SaleView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, sale_id: AggregateId) -> Option<SaleView> {
        self.store.get(tenant_id, &sale_id)
    }

    /// Newest first.
    pub fn list(&self, tenant_id: TenantId, filter: &SaleFilter) -> Vec<SaleView> {
        let mut sales: Vec<SaleView> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|s| filter.outlet_id.is_none_or(|o| s.document.outlet_id == o))
            .filter(|s| filter.from.is_none_or(|from| s.document.occurred_at >= from))
            .filter(|s| filter.to.is_none_or(|to| s.document.occurred_at < to))
            .collect();
        sales.sort_by(|a, b| b.document.occurred_at.cmp(&a.document.occurred_at));
        sales
    }

    pub fn posting_sources(&self, tenant_id: TenantId) -> Vec<PostingSource> {
        let mut sales = self.store.list(tenant_id);
        sales.sort_by_key(|s| s.document.occurred_at);
        sales.iter().flat_map(SaleView::posting_sources).collect()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }
        self.cursors.apply_once(envelope, || {
            let tenant_id = envelope.tenant_id();
            match decode::<SaleEvent>(envelope)? {
                SaleEvent::SaleRecorded(e) => self.store.upsert(
                    tenant_id,
                    envelope.aggregate_id(),
                    SaleView {
                        document: e.document,
                        status: SaleStatus::Completed,
                        void_reason: None,
                        voided_at: None,
                    },
                ),
                SaleEvent::SaleVoided(e) => {
                    if let Some(mut view) = self.store.get(tenant_id, &envelope.aggregate_id()) {
                        view.status = SaleStatus::Voided;
                        view.void_reason = Some(e.reason);
                        view.voided_at = Some(e.occurred_at);
                        self.store.upsert(tenant_id, envelope.aggregate_id(), view);
                    }
                }
            }
            Ok(())
        })
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        self.cursors.clear_tenant(tenant_id);
        self.store.clear_tenant(tenant_id);
    }
}
