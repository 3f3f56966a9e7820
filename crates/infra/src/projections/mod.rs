//! Projections: query-side read models folded from published envelopes.
//!
//! Every projection is tenant-isolated, idempotent per stream (see
//! [`StreamCursors`]) and rebuildable from the event store.

pub mod balances;
pub mod cursor;
pub mod debts;
pub mod products;
pub mod purchases;
pub mod sales;
pub mod shifts;
pub mod stock_levels;

use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use tokoledger_accounting::PostingSource;
use tokoledger_core::{AggregateId, TenantId};
use tokoledger_events::EventEnvelope;

use crate::event_store::{EventStore, EventStoreError, StoredEvent};

pub use balances::LedgerBalancesProjection;
pub use cursor::StreamCursors;
pub use debts::{DebtView, DebtsProjection};
pub use products::{ProductCatalogProjection, ProductView};
pub use purchases::PurchasesProjection;
pub use sales::{SaleFilter, SaleView, SalesProjection};
pub use shifts::{ShiftClosing, ShiftView, ShiftsProjection};
pub use stock_levels::{StockLevel, StockLevelsProjection};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("cannot decode {aggregate_type} event: {message}")]
    Deserialize { aggregate_type: String, message: String },

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("projection lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Store(#[from] EventStoreError),
}

pub(crate) fn decode<E: DeserializeOwned>(envelope: &EventEnvelope<JsonValue>) -> Result<E, ProjectionError> {
    envelope.decode().map_err(|e| ProjectionError::Deserialize {
        aggregate_type: envelope.aggregate_type().to_string(),
        message: e.to_string(),
    })
}

/// Every read model the application queries, fed from one place.
#[derive(Debug, Default)]
pub struct Projections {
    pub ledger: LedgerBalancesProjection,
    pub products: ProductCatalogProjection,
    pub stock: StockLevelsProjection,
    pub purchases: PurchasesProjection,
    pub sales: SalesProjection,
    pub debts: DebtsProjection,
    pub shifts: ShiftsProjection,
    catch_up: Mutex<()>,
}

impl Projections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route an envelope to every projection; each ignores foreign aggregate types.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        self.ledger.apply_envelope(envelope)?;
        self.products.apply_envelope(envelope)?;
        self.stock.apply_envelope(envelope)?;
        self.purchases.apply_envelope(envelope)?;
        self.sales.apply_envelope(envelope)?;
        self.debts.apply_envelope(envelope)?;
        self.shifts.apply_envelope(envelope)
    }

    /// Apply freshly committed events.
    ///
    /// Two writers on one stream can finish out of order; when that leaves a
    /// gap the whole stream is re-read from `store` instead.
    pub fn apply_committed<S>(&self, store: &S, committed: &[StoredEvent]) -> Result<(), ProjectionError>
    where
        S: EventStore + ?Sized,
    {
        let _guard = self.catch_up.lock().map_err(|_| ProjectionError::Poisoned)?;
        for stored in committed {
            match self.apply_envelope(&stored.to_envelope()) {
                Err(ProjectionError::NonMonotonicSequence { .. }) => {
                    self.replay_stream(store, stored.tenant_id, stored.aggregate_id)?;
                }
                other => other?,
            }
        }
        Ok(())
    }

    fn replay_stream<S>(&self, store: &S, tenant_id: TenantId, aggregate_id: AggregateId) -> Result<(), ProjectionError>
    where
        S: EventStore + ?Sized,
    {
        for stored in store.load_stream(tenant_id, aggregate_id)? {
            self.apply_envelope(&stored.to_envelope())?;
        }
        Ok(())
    }

    /// Drop a tenant's read models and refold them from `envelopes`.
    pub fn rebuild_tenant(
        &self,
        tenant_id: TenantId,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        let _guard = self.catch_up.lock().map_err(|_| ProjectionError::Poisoned)?;
        self.ledger.clear_tenant(tenant_id);
        self.products.clear_tenant(tenant_id);
        self.stock.clear_tenant(tenant_id);
        self.purchases.clear_tenant(tenant_id);
        self.sales.clear_tenant(tenant_id);
        self.debts.clear_tenant(tenant_id);
        self.shifts.clear_tenant(tenant_id);

        let mut envelopes: Vec<_> = envelopes.into_iter().filter(|e| e.tenant_id() == tenant_id).collect();
        envelopes.sort_by_key(|e| (e.aggregate_id(), e.sequence_number()));
        for envelope in &envelopes {
            self.apply_envelope(envelope)?;
        }
        Ok(())
    }

    /// Every document the journal should contain, oldest first per source.
    pub fn posting_sources(&self, tenant_id: TenantId) -> Vec<PostingSource> {
        let mut sources = self.sales.posting_sources(tenant_id);
        sources.extend(self.purchases.posting_sources(tenant_id));
        sources.extend(self.debts.posting_sources(tenant_id));
        sources.extend(self.shifts.posting_sources(tenant_id));
        sources
    }
}

#[cfg(test)]
mod tests {
    use tokoledger_core::{OutletId, TenantId};

    use crate::event_store::EventStore;
    use crate::workflows::testing::{create_product, open_shift, workflows};

    #[test]
    fn rebuild_refolds_a_tenant_from_its_streams() {
        let wf = workflows();
        let tenant = TenantId::new();
        let outlet = OutletId::new();
        let tea = create_product(&wf, tenant, "teh", 5_000, 3_000);
        let shift_id = open_shift(&wf, tenant, outlet, 50_000);

        let other = TenantId::new();
        let foreign = create_product(&wf, other, "kopi", 4_000, 2_500);

        let store = wf.dispatcher().store();
        let mut envelopes: Vec<_> = store
            .load_stream(tenant, tea.0)
            .unwrap()
            .iter()
            .chain(store.load_stream(tenant, outlet.into()).unwrap().iter())
            .chain(store.load_stream(other, foreign.0).unwrap().iter())
            .map(|stored| stored.to_envelope())
            .collect();
        envelopes.reverse();

        wf.projections().rebuild_tenant(tenant, envelopes).unwrap();

        assert_eq!(wf.projections().products.get(tenant, tea).unwrap().name, "teh");
        assert!(wf.projections().shifts.get(tenant, shift_id).unwrap().is_open());
        // Other tenants are left alone.
        assert!(wf.projections().products.get(other, foreign).is_some());
    }
}
