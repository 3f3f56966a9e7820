//! Stock on hand per product and outlet.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use tokoledger_core::{AggregateId, Money, OutletId, TenantId};
use tokoledger_events::EventEnvelope;
use tokoledger_inventory::{ProductId, StockEvent, StockItemId, stock::AGGREGATE_TYPE};

use crate::read_model::{InMemoryTenantStore, TenantStore};

use super::{ProjectionError, StreamCursors, decode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub outlet_id: OutletId,
    pub on_hand: i64,
    pub average_cost: Money,
    pub updated_at: DateTime<Utc>,
}

impl StockLevel {
    pub fn value(&self) -> Money {
        Money::new(self.average_cost.amount().saturating_mul(self.on_hand.max(0)))
    }
}

#[derive(Debug)]
pub struct StockLevelsProjection<S = InMemoryTenantStore<AggregateId, StockLevel>> {
    store: S,
    cursors: StreamCursors,
}

impl Default for StockLevelsProjection {
    fn default() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl<S> StockLevelsProjection<S>
where
    S: TenantStore<AggregateId, StockLevel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, product_id: ProductId, outlet_id: OutletId) -> Option<StockLevel> {
        self.store
            .get(tenant_id, &StockItemId::for_outlet(product_id, outlet_id).aggregate_id())
    }

    pub fn for_outlet(&self, tenant_id: TenantId, outlet_id: OutletId) -> Vec<StockLevel> {
        let mut levels: Vec<StockLevel> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|l| l.outlet_id == outlet_id)
            .collect();
        levels.sort_by_key(|l| l.product_id);
        levels
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }
        self.cursors.apply_once(envelope, || {
            let level = match decode::<StockEvent>(envelope)? {
                StockEvent::StockOpened(e) => StockLevel {
                    product_id: e.product_id,
                    outlet_id: e.outlet_id,
                    on_hand: 0,
                    average_cost: e.initial_cost,
                    updated_at: e.occurred_at,
                },
                StockEvent::StockMoved(e) => StockLevel {
                    product_id: e.product_id,
                    outlet_id: e.outlet_id,
                    on_hand: e.on_hand_after,
                    average_cost: e.average_cost_after,
                    updated_at: e.occurred_at,
                },
            };
            self.store.upsert(envelope.tenant_id(), envelope.aggregate_id(), level);
            Ok(())
        })
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        self.cursors.clear_tenant(tenant_id);
        self.store.clear_tenant(tenant_id);
    }
}
