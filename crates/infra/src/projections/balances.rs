//! Ledger → trial balance per tenant.

use serde_json::Value as JsonValue;

use tokoledger_accounting::{LedgerEvent, LedgerId, TrialBalance, ledger::AGGREGATE_TYPE};
use tokoledger_core::{AggregateId, TenantId};
use tokoledger_events::EventEnvelope;

use crate::read_model::{InMemoryTenantStore, TenantStore};

use super::{ProjectionError, StreamCursors, decode};

#[derive(Debug)]
pub struct LedgerBalancesProjection<S = InMemoryTenantStore<AggregateId, TrialBalance>> {
    store: S,
    cursors: StreamCursors,
}

impl Default for LedgerBalancesProjection {
    fn default() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl<S> LedgerBalancesProjection<S>
where
    S: TenantStore<AggregateId, TrialBalance>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn trial_balance(&self, tenant_id: TenantId) -> TrialBalance {
        self.store
            .get(tenant_id, &LedgerId::for_tenant(tenant_id).aggregate_id())
            .unwrap_or_default()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }
        self.cursors.apply_once(envelope, || {
            let event: LedgerEvent = decode(envelope)?;
            self.store.update(
                envelope.tenant_id(),
                envelope.aggregate_id(),
                TrialBalance::new,
                |tb| tb.apply(&event),
            );
            Ok(())
        })
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        self.cursors.clear_tenant(tenant_id);
        self.store.clear_tenant(tenant_id);
    }
}
