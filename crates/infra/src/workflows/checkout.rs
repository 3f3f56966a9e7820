//! Checkout: sale, stock, drawer, receivable and journal from one cart.
//!
//! ```text
//! open shift? → price cart → plan → stock pre-check → record sale
//!   → draw stock → shift takings → receivable → journal
//! ```
//!
//! Nothing is written before the stock pre-check passes. When a draw or the
//! shift update fails, stock already drawn is returned and the sale voided.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, warn};
use uuid::Uuid;

use tokoledger_core::{AggregateId, DomainError, Money, OutletId, TenantId, UserId};
use tokoledger_events::{EventBus, EventEnvelope};
use tokoledger_inventory::{MovementKind, ProductId, RecordMovement, StockCommand, stock::AGGREGATE_TYPE as STOCK};
use tokoledger_pos::{
    Cart, CheckoutRequest, OrderDiscount, ReceivableDraft, RecordSale, RecordShiftSale, RegisterCommand,
    SaleCommand, SaleDocument, StockDraw, Tender, VoidSale, plan, register::AGGREGATE_TYPE as REGISTER,
    sale::AGGREGATE_TYPE as SALE,
};
use tokoledger_receivables::{DebtCommand, DebtId, DebtKind, OpenDebt, debt::AGGREGATE_TYPE as DEBT};

use crate::event_store::EventStore;

use super::{
    PostingOutcome, StockShortage, WorkflowError, Workflows, debt_of, register_of, sale_of, stock_of,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub product_id: ProductId,
    pub unit: String,
    pub quantity: i64,
    #[serde(default)]
    pub discount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutInput {
    pub outlet_id: OutletId,
    pub cashier: UserId,
    pub items: Vec<CheckoutItem>,
    pub order_discount: OrderDiscount,
    pub tenders: Vec<Tender>,
    pub customer: Option<String>,
    pub due_date: Option<NaiveDate>,
    /// Generated from the sale id when absent.
    pub receipt_no: Option<String>,
    /// The cashier confirmed selling more than is on hand.
    pub allow_negative_stock: bool,
    pub tax_bps: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutOutcome {
    pub sale: SaleDocument,
    pub debt_id: Option<DebtId>,
    /// `None` when posting failed; see `warnings`.
    pub journal: Option<PostingOutcome>,
    pub warnings: Vec<String>,
}

/// `TRX-<yyyymmdd>-<last six hex digits of the sale id>`.
pub fn receipt_number(sale_id: Uuid, occurred_at: DateTime<Utc>) -> String {
    let hex = sale_id.simple().to_string();
    let suffix = &hex[hex.len() - 6..];
    format!("TRX-{}-{}", occurred_at.format("%Y%m%d"), suffix.to_uppercase())
}

impl<S, B> Workflows<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn checkout(&self, tenant_id: TenantId, input: CheckoutInput) -> Result<CheckoutOutcome, WorkflowError> {
        let register = self.register(tenant_id, input.outlet_id)?;
        let Some(shift) = register.active_shift() else {
            return Err(DomainError::conflict("no open shift at this outlet").into());
        };
        let shift_id = shift.shift_id;

        let cart = self.price_cart(tenant_id, &input)?;

        let sale_id = Uuid::now_v7();
        let receipt_no = input
            .receipt_no
            .clone()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| receipt_number(sale_id, input.occurred_at));
        let plan = plan(
            &cart,
            CheckoutRequest {
                sale_id,
                receipt_no,
                outlet_id: input.outlet_id,
                shift_id,
                cashier: input.cashier,
                customer: input.customer.clone(),
                due_date: input.due_date,
                tenders: input.tenders.clone(),
                occurred_at: input.occurred_at,
            },
        )?;

        if !input.allow_negative_stock {
            let shortages = self.stock_shortages(tenant_id, &plan.sale, &plan.stock_draws)?;
            if !shortages.is_empty() {
                return Err(WorkflowError::InsufficientStock(shortages));
            }
        }

        self.execute(
            tenant_id,
            AggregateId::from_uuid(sale_id),
            SALE,
            SaleCommand::RecordSale(RecordSale {
                document: plan.sale.clone(),
            }),
            sale_of,
        )?;

        let mut drawn: Vec<StockDraw> = Vec::with_capacity(plan.stock_draws.len());
        for draw in &plan.stock_draws {
            if let Err(e) = self.draw_stock(tenant_id, &plan.sale, draw, input.allow_negative_stock) {
                self.abort_checkout(tenant_id, &plan.sale, &drawn, &e);
                return Err(e);
            }
            drawn.push(*draw);
        }

        let takings = self.execute(
            tenant_id,
            input.outlet_id.into(),
            REGISTER,
            RegisterCommand::RecordShiftSale(RecordShiftSale {
                shift_id,
                sale_id,
                cash: plan.shift.cash,
                non_cash: plan.shift.non_cash,
                occurred_at: input.occurred_at,
            }),
            register_of,
        );
        if let Err(e) = takings {
            self.abort_checkout(tenant_id, &plan.sale, &drawn, &e);
            return Err(e);
        }

        let mut warnings = Vec::new();
        let debt_id = plan
            .receivable
            .as_ref()
            .and_then(|draft| self.open_receivable(tenant_id, &plan.sale, draft, &mut warnings));
        let journal = self.post_or_warn(tenant_id, &plan.posting, &mut warnings);

        info!(
            %tenant_id,
            %sale_id,
            receipt_no = %plan.sale.receipt_no,
            total = %plan.sale.totals.total,
            outstanding = %plan.sale.outstanding,
            "checkout completed"
        );

        Ok(CheckoutOutcome {
            sale: plan.sale,
            debt_id,
            journal,
            warnings,
        })
    }

    fn price_cart(&self, tenant_id: TenantId, input: &CheckoutInput) -> Result<Cart, WorkflowError> {
        let mut cart = Cart::new(input.tax_bps);
        for item in &input.items {
            let product = self.product(tenant_id, item.product_id)?;
            let idx = cart.add(&product, &item.unit, item.quantity)?;
            if !item.discount.is_zero() {
                cart.add_line_discount(idx, item.discount)?;
            }
        }
        cart.set_order_discount(input.order_discount)?;

        // Price at the outlet's moving average where stock has one.
        let products: BTreeSet<ProductId> = cart.lines().iter().map(|l| l.product_id).collect();
        for product_id in products {
            let item = self.stock_item(tenant_id, product_id, input.outlet_id)?;
            if item.is_created() && item.average_cost().is_positive() {
                cart.set_base_cost(product_id, item.average_cost())?;
            }
        }
        Ok(cart)
    }

    fn stock_shortages(
        &self,
        tenant_id: TenantId,
        sale: &SaleDocument,
        draws: &[StockDraw],
    ) -> Result<Vec<StockShortage>, WorkflowError> {
        let mut shortages = Vec::new();
        for draw in draws {
            let on_hand = self.stock_item(tenant_id, draw.product_id, sale.outlet_id)?.on_hand();
            if on_hand < draw.base_quantity {
                let product_name = sale
                    .lines
                    .iter()
                    .find(|l| l.product_id == draw.product_id)
                    .map(|l| l.product_name.clone())
                    .unwrap_or_default();
                shortages.push(StockShortage {
                    product_id: draw.product_id,
                    product_name,
                    on_hand,
                    requested: draw.base_quantity,
                });
            }
        }
        Ok(shortages)
    }

    fn draw_stock(
        &self,
        tenant_id: TenantId,
        sale: &SaleDocument,
        draw: &StockDraw,
        allow_negative: bool,
    ) -> Result<(), WorkflowError> {
        let id = self.ensure_stock(tenant_id, draw.product_id, sale.outlet_id, sale.occurred_at)?;
        self.execute(
            tenant_id,
            id.aggregate_id(),
            STOCK,
            StockCommand::RecordMovement(RecordMovement {
                kind: MovementKind::Sale,
                quantity: -draw.base_quantity,
                unit_cost: None,
                reference: format!("sale:{}", sale.sale_id),
                allow_negative,
                occurred_at: sale.occurred_at,
            }),
            stock_of,
        )?;
        Ok(())
    }

    /// Put `draw` back on the shelf.
    pub(crate) fn return_stock(
        &self,
        tenant_id: TenantId,
        outlet_id: OutletId,
        draw: &StockDraw,
        reference: String,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        let id = self.ensure_stock(tenant_id, draw.product_id, outlet_id, occurred_at)?;
        self.execute(
            tenant_id,
            id.aggregate_id(),
            STOCK,
            StockCommand::RecordMovement(RecordMovement {
                kind: MovementKind::Return,
                quantity: draw.base_quantity,
                unit_cost: None,
                reference,
                allow_negative: false,
                occurred_at,
            }),
            stock_of,
        )?;
        Ok(())
    }

    fn abort_checkout(&self, tenant_id: TenantId, sale: &SaleDocument, drawn: &[StockDraw], cause: &WorkflowError) {
        warn!(%tenant_id, sale_id = %sale.sale_id, "checkout failed after the sale was recorded, compensating: {cause}");
        let now = Utc::now();

        for draw in drawn {
            let reference = format!("sale:{}:compensation", sale.sale_id);
            if let Err(e) = self.return_stock(tenant_id, sale.outlet_id, draw, reference, now) {
                warn!(%tenant_id, sale_id = %sale.sale_id, product_id = %draw.product_id, "stock return failed: {e}");
            }
        }

        let voided = self.execute(
            tenant_id,
            AggregateId::from_uuid(sale.sale_id),
            SALE,
            SaleCommand::VoidSale(VoidSale {
                reason: format!("checkout aborted: {cause}"),
                occurred_at: now,
            }),
            sale_of,
        );
        if let Err(e) = voided {
            warn!(%tenant_id, sale_id = %sale.sale_id, "voiding the aborted sale failed: {e}");
        }
    }

    fn open_receivable(
        &self,
        tenant_id: TenantId,
        sale: &SaleDocument,
        draft: &ReceivableDraft,
        warnings: &mut Vec<String>,
    ) -> Option<DebtId> {
        let debt_id = DebtId::new(AggregateId::new());
        let opened = self.execute(
            tenant_id,
            debt_id.0,
            DEBT,
            DebtCommand::OpenDebt(OpenDebt {
                kind: DebtKind::Receivable,
                party: draft.party.clone(),
                amount: draft.amount,
                due_date: draft.due_date,
                source_reference: Some(format!("sale:{}", sale.sale_id)),
                note: Some(sale.receipt_no.clone()),
                occurred_at: sale.occurred_at,
            }),
            debt_of,
        );
        match opened {
            Ok(_) => Some(debt_id),
            Err(e) => {
                warn!(%tenant_id, sale_id = %sale.sale_id, "receivable not opened: {e}");
                warnings.push(format!("receivable for {} not opened: {e}", draft.party));
                None
            }
        }
    }
}
