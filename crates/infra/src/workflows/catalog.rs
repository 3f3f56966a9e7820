//! Single-aggregate writes for the catalog and stock counts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;
use uuid::Uuid;

use tokoledger_core::{AggregateId, DomainError, Money, OutletId, TenantId};
use tokoledger_events::{EventBus, EventEnvelope};
use tokoledger_inventory::{
    ArchiveProduct, CountStock, CreateProduct, MovementKind, ProductCommand, ProductId, ProductUnit,
    RecordMovement, StockCommand, UpdatePricing, product::AGGREGATE_TYPE as PRODUCT, stock::AGGREGATE_TYPE as STOCK,
};

use crate::event_store::EventStore;
use crate::projections::StockLevel;

use super::{WorkflowError, Workflows, product_of, stock_of};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub units: Vec<ProductUnit>,
    pub cost_price: Money,
}

/// A manual stock correction in base units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    /// Signed change; negative for breakage or loss.
    pub quantity: i64,
    /// Cost of added units; the current average when absent.
    #[serde(default)]
    pub unit_cost: Option<Money>,
    pub reason: String,
}

impl<S, B> Workflows<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn create_product(
        &self,
        tenant_id: TenantId,
        input: NewProduct,
        occurred_at: DateTime<Utc>,
    ) -> Result<ProductId, WorkflowError> {
        let product_id = ProductId::new(AggregateId::new());
        self.execute(
            tenant_id,
            product_id.0,
            PRODUCT,
            ProductCommand::CreateProduct(CreateProduct {
                sku: input.sku,
                name: input.name,
                units: input.units,
                cost_price: input.cost_price,
                occurred_at,
            }),
            product_of,
        )?;
        info!(%tenant_id, %product_id, "product created");
        Ok(product_id)
    }

    pub fn update_pricing(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        units: Vec<ProductUnit>,
        cost_price: Option<Money>,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        self.product(tenant_id, product_id)?;
        self.execute(
            tenant_id,
            product_id.0,
            PRODUCT,
            ProductCommand::UpdatePricing(UpdatePricing {
                units,
                cost_price,
                occurred_at,
            }),
            product_of,
        )?;
        Ok(())
    }

    pub fn archive_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        self.product(tenant_id, product_id)?;
        self.execute(
            tenant_id,
            product_id.0,
            PRODUCT,
            ProductCommand::ArchiveProduct(ArchiveProduct { occurred_at }),
            product_of,
        )?;
        info!(%tenant_id, %product_id, "product archived");
        Ok(())
    }

    pub fn adjust_stock(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        outlet_id: OutletId,
        adjustment: StockAdjustment,
        occurred_at: DateTime<Utc>,
    ) -> Result<StockLevel, WorkflowError> {
        let reason = adjustment.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("an adjustment needs a reason").into());
        }
        let id = self.ensure_stock(tenant_id, product_id, outlet_id, occurred_at)?;
        self.execute(
            tenant_id,
            id.aggregate_id(),
            STOCK,
            StockCommand::RecordMovement(RecordMovement {
                kind: MovementKind::Adjustment,
                quantity: adjustment.quantity,
                unit_cost: adjustment.unit_cost,
                reference: format!("adjustment:{}:{reason}", Uuid::now_v7()),
                allow_negative: false,
                occurred_at,
            }),
            stock_of,
        )?;
        self.stock_level(tenant_id, product_id, outlet_id)
    }

    /// Set on-hand to a physical count; a matching count writes nothing.
    pub fn count_stock(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        outlet_id: OutletId,
        counted: i64,
        occurred_at: DateTime<Utc>,
    ) -> Result<StockLevel, WorkflowError> {
        let id = self.ensure_stock(tenant_id, product_id, outlet_id, occurred_at)?;
        self.execute(
            tenant_id,
            id.aggregate_id(),
            STOCK,
            StockCommand::CountStock(CountStock {
                counted,
                reference: format!("count:{}", Uuid::now_v7()),
                occurred_at,
            }),
            stock_of,
        )?;
        self.stock_level(tenant_id, product_id, outlet_id)
    }

    fn stock_level(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        outlet_id: OutletId,
    ) -> Result<StockLevel, WorkflowError> {
        self.projections()
            .stock
            .get(tenant_id, product_id, outlet_id)
            .ok_or_else(|| WorkflowError::NotFound(format!("stock of product {product_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projections::ProductView;
    use crate::workflows::testing::{create_product, workflows};

    #[test]
    fn product_lifecycle() {
        let wf = workflows();
        let tenant = TenantId::new();
        let id = wf
            .create_product(
                tenant,
                NewProduct {
                    sku: "KOPI-01".into(),
                    name: "kopi sachet".into(),
                    units: vec![ProductUnit::new("pcs", 1, Money::new(2_000))],
                    cost_price: Money::new(1_500),
                },
                Utc::now(),
            )
            .unwrap();

        wf.update_pricing(
            tenant,
            id,
            vec![
                ProductUnit::new("pcs", 1, Money::new(2_500)),
                ProductUnit::new("renteng", 10, Money::new(23_000)),
            ],
            None,
            Utc::now(),
        )
        .unwrap();
        let view: ProductView = wf.projections().products.get(tenant, id).unwrap();
        assert_eq!(view.units.len(), 2);
        assert_eq!(view.cost_price, Money::new(1_500));

        wf.archive_product(tenant, id, Utc::now()).unwrap();
        assert!(wf.projections().products.list(tenant, false).is_empty());
        assert_eq!(wf.projections().products.list(tenant, true).len(), 1);
    }

    #[test]
    fn adjustments_and_counts_move_on_hand() {
        let wf = workflows();
        let tenant = TenantId::new();
        let outlet = OutletId::new();
        let rice = create_product(&wf, tenant, "beras", 14_000, 11_000);

        let adjustment = StockAdjustment {
            quantity: 25,
            unit_cost: None,
            reason: "opening balance".into(),
        };
        let level = wf.adjust_stock(tenant, rice, outlet, adjustment, Utc::now()).unwrap();
        assert_eq!(level.on_hand, 25);
        assert_eq!(level.average_cost, Money::new(11_000));

        let level = wf.count_stock(tenant, rice, outlet, 23, Utc::now()).unwrap();
        assert_eq!(level.on_hand, 23);

        let no_reason = StockAdjustment {
            quantity: -1,
            unit_cost: None,
            reason: " ".into(),
        };
        assert!(wf.adjust_stock(tenant, rice, outlet, no_reason, Utc::now()).is_err());
    }

    #[test]
    fn unknown_products_are_not_found() {
        let wf = workflows();
        let tenant = TenantId::new();
        let ghost = ProductId::new(AggregateId::new());
        let err = wf.archive_product(tenant, ghost, Utc::now()).unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
        let err = wf.count_stock(tenant, ghost, OutletId::new(), 1, Utc::now()).unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
    }
}
