//! Product catalog read model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use tokoledger_core::{AggregateId, Money, TenantId};
use tokoledger_events::EventEnvelope;
use tokoledger_inventory::{ProductEvent, ProductId, ProductStatus, ProductUnit, product::AGGREGATE_TYPE};

use crate::read_model::{InMemoryTenantStore, TenantStore};

use super::{ProjectionError, StreamCursors, decode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductView {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub units: Vec<ProductUnit>,
    pub cost_price: Money,
    pub status: ProductStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ProductCatalogProjection<S = InMemoryTenantStore<AggregateId, ProductView>> {
    store: S,
    cursors: StreamCursors,
}

impl Default for ProductCatalogProjection {
    fn default() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl<S> ProductCatalogProjection<S>
where
    S: TenantStore<AggregateId, ProductView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, product_id: ProductId) -> Option<ProductView> {
        self.store.get(tenant_id, &product_id.0)
    }

    /// Sorted by name; archived products only when asked for.
    pub fn list(&self, tenant_id: TenantId, include_archived: bool) -> Vec<ProductView> {
        let mut products: Vec<ProductView> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|p| include_archived || p.status == ProductStatus::Active)
            .collect();
        products.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        products
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }
        self.cursors.apply_once(envelope, || {
            let tenant_id = envelope.tenant_id();
            match decode::<ProductEvent>(envelope)? {
                ProductEvent::ProductCreated(e) => self.store.upsert(
                    tenant_id,
                    e.product_id.0,
                    ProductView {
                        product_id: e.product_id,
                        sku: e.sku,
                        name: e.name,
                        units: e.units,
                        cost_price: e.cost_price,
                        status: ProductStatus::Active,
                        updated_at: e.occurred_at,
                    },
                ),
                ProductEvent::PricingUpdated(e) => {
                    if let Some(mut view) = self.store.get(tenant_id, &e.product_id.0) {
                        view.units = e.units;
                        view.cost_price = e.cost_price;
                        view.updated_at = e.occurred_at;
                        self.store.upsert(tenant_id, e.product_id.0, view);
                    }
                }
                ProductEvent::ProductArchived(e) => {
                    if let Some(mut view) = self.store.get(tenant_id, &e.product_id.0) {
                        view.status = ProductStatus::Archived;
                        view.updated_at = e.occurred_at;
                        self.store.upsert(tenant_id, e.product_id.0, view);
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
