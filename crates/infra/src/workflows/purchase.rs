//! Receiving stock from a supplier.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, warn};
use uuid::Uuid;

use tokoledger_accounting::{Fund, PostingSource};
use tokoledger_core::{AggregateId, DomainError, Money, OutletId, TenantId};
use tokoledger_events::{EventBus, EventEnvelope};
use tokoledger_inventory::{
    MovementKind, ProductId, PurchaseCommand, PurchaseDocument, RecordMovement, RecordPurchase, ReceivedLine,
    StockCommand, purchase::AGGREGATE_TYPE as PURCHASE, stock::AGGREGATE_TYPE as STOCK,
};
use tokoledger_receivables::{DebtCommand, DebtId, DebtKind, OpenDebt, debt::AGGREGATE_TYPE as DEBT};

use crate::event_store::EventStore;

use super::{PostingOutcome, WorkflowError, Workflows, debt_of, purchase_of, stock_of};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub product_id: ProductId,
    /// Purchase unit; the base unit when absent.
    #[serde(default)]
    pub unit: Option<String>,
    pub quantity: i64,
    /// Cost of one purchase unit.
    pub unit_cost: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseInput {
    pub outlet_id: OutletId,
    pub supplier: String,
    pub lines: Vec<PurchaseLine>,
    pub paid: Money,
    pub fund: Fund,
    pub due_date: Option<NaiveDate>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseOutcome {
    pub purchase_id: Uuid,
    pub total: Money,
    pub paid: Money,
    pub unpaid: Money,
    pub debt_id: Option<DebtId>,
    pub journal: Option<PostingOutcome>,
    pub warnings: Vec<String>,
}

fn line_total(line: &PurchaseLine) -> Result<Money, DomainError> {
    line.unit_cost
        .times(line.quantity)
        .ok_or_else(|| DomainError::validation("purchase line amount out of range"))
}

/// `total / qty`, rounded half-up.
fn per_unit(total: Money, qty: i64) -> Money {
    let qty = qty as i128;
    Money::new(((total.amount() as i128 + qty / 2) / qty) as i64)
}

impl<S, B> Workflows<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Receive stock at cost → record the purchase → payable for the unpaid
    /// part → purchase entry.
    ///
    /// Stock received before a failing line (or a failing record) is taken
    /// back out with a compensating adjustment.
    pub fn purchase(&self, tenant_id: TenantId, input: PurchaseInput) -> Result<PurchaseOutcome, WorkflowError> {
        let supplier = input.supplier.trim();
        if supplier.is_empty() {
            return Err(DomainError::validation("supplier is required").into());
        }
        if input.lines.is_empty() {
            return Err(DomainError::validation("a purchase needs at least one line").into());
        }

        let mut lines = Vec::with_capacity(input.lines.len());
        let mut total = Money::ZERO;
        for line in &input.lines {
            if line.quantity <= 0 {
                return Err(DomainError::validation("quantity must be positive").into());
            }
            if line.unit_cost.is_negative() {
                return Err(DomainError::validation("unit cost cannot be negative").into());
            }
            let product = self.product(tenant_id, line.product_id)?;
            if product.is_archived() {
                return Err(DomainError::invariant(format!("product '{}' is archived", product.name())).into());
            }
            let factor = match line.unit.as_deref() {
                Some(name) => product
                    .unit(name)
                    .map(|u| u.factor)
                    .ok_or_else(|| DomainError::validation(format!("unknown unit '{name}' for '{}'", product.name())))?,
                None => 1,
            };

            let amount = line_total(line)?;
            let base_quantity = line
                .quantity
                .checked_mul(factor)
                .ok_or_else(|| DomainError::validation("quantity out of range"))?;
            total = total
                .checked_add(amount)
                .ok_or_else(|| DomainError::validation("purchase total out of range"))?;
            lines.push(ReceivedLine {
                product_id: line.product_id,
                base_quantity,
                base_cost: per_unit(amount, base_quantity),
                amount,
            });
        }

        if input.paid.is_negative() || input.paid > total {
            return Err(DomainError::validation("paid amount must be between zero and the total").into());
        }
        let unpaid = total - input.paid;

        let purchase_id = Uuid::now_v7();
        let document = PurchaseDocument {
            purchase_id,
            outlet_id: input.outlet_id,
            supplier: supplier.to_string(),
            lines,
            total,
            paid: input.paid,
            fund: input.fund,
            unpaid,
            due_date: input.due_date,
            note: input.note.clone(),
            occurred_at: input.occurred_at,
        };
        let posting = PostingSource::Purchase(document.posting());
        self.check_posting(tenant_id, &posting)?;

        for (received, line) in document.lines.iter().enumerate() {
            if let Err(e) = self.receive_stock(tenant_id, &document, line) {
                self.abort_purchase(tenant_id, &document, &document.lines[..received], &e);
                return Err(e);
            }
        }

        let recorded = self.execute(
            tenant_id,
            AggregateId::from_uuid(purchase_id),
            PURCHASE,
            PurchaseCommand::RecordPurchase(RecordPurchase {
                document: document.clone(),
            }),
            purchase_of,
        );
        if let Err(e) = recorded {
            self.abort_purchase(tenant_id, &document, &document.lines, &e);
            return Err(e);
        }

        let mut warnings = Vec::new();
        let debt_id = if unpaid.is_positive() {
            let debt_id = DebtId::new(AggregateId::new());
            let opened = self.execute(
                tenant_id,
                debt_id.0,
                DEBT,
                DebtCommand::OpenDebt(OpenDebt {
                    kind: DebtKind::Payable,
                    party: supplier.to_string(),
                    amount: unpaid,
                    due_date: input.due_date,
                    source_reference: Some(format!("purchase:{purchase_id}")),
                    note: input.note.clone(),
                    occurred_at: input.occurred_at,
                }),
                debt_of,
            );
            match opened {
                Ok(_) => Some(debt_id),
                Err(e) => {
                    warn!(%tenant_id, %purchase_id, "payable not opened: {e}");
                    warnings.push(format!("payable to {supplier} not opened: {e}"));
                    None
                }
            }
        } else {
            None
        };

        let journal = self.post_or_warn(tenant_id, &posting, &mut warnings);

        info!(%tenant_id, %purchase_id, %total, %unpaid, supplier, "purchase received");

        Ok(PurchaseOutcome {
            purchase_id,
            total,
            paid: input.paid,
            unpaid,
            debt_id,
            journal,
            warnings,
        })
    }

    fn receive_stock(
        &self,
        tenant_id: TenantId,
        purchase: &PurchaseDocument,
        line: &ReceivedLine,
    ) -> Result<(), WorkflowError> {
        let id = self.ensure_stock(tenant_id, line.product_id, purchase.outlet_id, purchase.occurred_at)?;
        self.execute(
            tenant_id,
            id.aggregate_id(),
            STOCK,
            StockCommand::RecordMovement(RecordMovement {
                kind: MovementKind::Purchase,
                quantity: line.base_quantity,
                unit_cost: Some(line.base_cost),
                reference: format!("purchase:{}", purchase.purchase_id),
                allow_negative: false,
                occurred_at: purchase.occurred_at,
            }),
            stock_of,
        )?;
        Ok(())
    }

    fn abort_purchase(
        &self,
        tenant_id: TenantId,
        purchase: &PurchaseDocument,
        received: &[ReceivedLine],
        cause: &WorkflowError,
    ) {
        let purchase_id = purchase.purchase_id;
        warn!(%tenant_id, %purchase_id, received = received.len(), "purchase stopped part way, compensating: {cause}");
        let now = Utc::now();

        for line in received {
            let taken_back = self
                .ensure_stock(tenant_id, line.product_id, purchase.outlet_id, now)
                .and_then(|id| {
                    self.execute(
                        tenant_id,
                        id.aggregate_id(),
                        STOCK,
                        StockCommand::RecordMovement(RecordMovement {
                            kind: MovementKind::Adjustment,
                            quantity: -line.base_quantity,
                            unit_cost: None,
                            reference: format!("purchase:{purchase_id}:compensation"),
                            allow_negative: true,
                            occurred_at: now,
                        }),
                        stock_of,
                    )
                });
            if let Err(e) = taken_back {
                warn!(%tenant_id, %purchase_id, product_id = %line.product_id, "received stock not taken back: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokoledger_accounting::codes;
    use tokoledger_inventory::{StockEvent, StockItemId};
    use tokoledger_receivables::DebtStatus;

    use crate::command_dispatcher::DispatchError;
    use crate::event_store::EventStore;

    use super::*;
    use crate::workflows::testing::{create_product, workflows};

    fn input(outlet_id: OutletId, lines: Vec<PurchaseLine>, paid: i64) -> PurchaseInput {
        PurchaseInput {
            outlet_id,
            supplier: "CV Sumber Rejeki".into(),
            lines,
            paid: Money::new(paid),
            fund: Fund::Bank,
            due_date: None,
            note: None,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn partly_paid_purchase_opens_a_payable() {
        let wf = workflows();
        let tenant = TenantId::new();
        let outlet = OutletId::new();
        let flour = create_product(&wf, tenant, "tepung", 12_000, 9_000);

        let line = PurchaseLine {
            product_id: flour,
            unit: Some("box".into()),
            quantity: 2,
            unit_cost: Money::new(95_000),
        };
        let out = wf.purchase(tenant, input(outlet, vec![line], 100_000)).unwrap();
        assert_eq!(out.total, Money::new(190_000));
        assert_eq!(out.unpaid, Money::new(90_000));
        assert!(out.journal.and_then(PostingOutcome::entry_id).is_some());

        let level = wf.projections().stock.get(tenant, flour, outlet).unwrap();
        assert_eq!(level.on_hand, 20);
        assert_eq!(level.average_cost, Money::new(9_500));

        let debt = wf.projections().debts.get(tenant, out.debt_id.unwrap()).unwrap();
        assert_eq!(debt.kind, DebtKind::Payable);
        assert_eq!(debt.status, DebtStatus::Unpaid);
        assert_eq!(debt.outstanding, Money::new(90_000));

        let tb = wf.projections().ledger.trial_balance(tenant);
        assert!(tb.is_balanced());
        assert_eq!(tb.balance(codes::INVENTORY), Money::new(190_000));
        assert_eq!(tb.balance(codes::BANK), Money::new(-100_000));
        assert_eq!(tb.balance(codes::ACCOUNTS_PAYABLE), Money::new(90_000));
    }

    #[test]
    fn fully_paid_purchase_has_no_payable() {
        let wf = workflows();
        let tenant = TenantId::new();
        let outlet = OutletId::new();
        let salt = create_product(&wf, tenant, "garam", 3_000, 2_000);

        let line = PurchaseLine {
            product_id: salt,
            unit: None,
            quantity: 3,
            unit_cost: Money::new(2_000),
        };
        let out = wf.purchase(tenant, input(outlet, vec![line], 6_000)).unwrap();
        assert!(out.debt_id.is_none());
        assert_eq!(out.unpaid, Money::ZERO);

        let recorded = wf
            .projections()
            .purchases
            .get(tenant, AggregateId::from_uuid(out.purchase_id))
            .unwrap();
        assert_eq!(recorded.lines[0].base_quantity, 3);
        assert_eq!(recorded.total, Money::new(6_000));

        let sources = wf.projections().posting_sources(tenant);
        assert!(!sources.is_empty());
        assert!(sources.iter().any(|s| matches!(s, PostingSource::Purchase(p) if p.purchase_id == out.purchase_id)));
    }

    #[test]
    fn backfill_finds_purchases_already_posted() {
        let wf = workflows();
        let tenant = TenantId::new();
        let outlet = OutletId::new();
        let oil = create_product(&wf, tenant, "minyak", 18_000, 15_000);
        let line = PurchaseLine {
            product_id: oil,
            unit: None,
            quantity: 4,
            unit_cost: Money::new(15_000),
        };
        wf.purchase(tenant, input(outlet, vec![line], 60_000)).unwrap();

        let report = wf.backfill(tenant, Utc::now()).unwrap();
        assert_eq!(report.posted, 0);
        assert_eq!(report.already_posted, 1);
    }

    #[test]
    fn failed_line_takes_earlier_lines_back_out() {
        let wf = workflows();
        let tenant = TenantId::new();
        let outlet = OutletId::new();
        let rice = create_product(&wf, tenant, "beras", 14_000, 12_000);
        let salt = create_product(&wf, tenant, "garam", 3_000, 2_000);

        // Salt is stocked so high that one more unit no longer fits.
        let salt_stock = wf.ensure_stock(tenant, salt, outlet, Utc::now()).unwrap();
        wf.execute(
            tenant,
            salt_stock.aggregate_id(),
            STOCK,
            StockCommand::RecordMovement(RecordMovement {
                kind: MovementKind::Adjustment,
                quantity: i64::MAX - 5,
                unit_cost: None,
                reference: "opening".into(),
                allow_negative: false,
                occurred_at: Utc::now(),
            }),
            stock_of,
        )
        .unwrap();

        let lines = vec![
            PurchaseLine {
                product_id: rice,
                unit: None,
                quantity: 3,
                unit_cost: Money::new(12_000),
            },
            PurchaseLine {
                product_id: salt,
                unit: None,
                quantity: 10,
                unit_cost: Money::new(2_000),
            },
        ];
        let err = wf.purchase(tenant, input(outlet, lines, 0)).unwrap_err();
        assert!(
            matches!(err, WorkflowError::Dispatch(DispatchError::Validation(_))),
            "{err:?}"
        );

        assert_eq!(wf.projections().stock.get(tenant, rice, outlet).unwrap().on_hand, 0);
        assert_eq!(wf.projections().stock.get(tenant, salt, outlet).unwrap().on_hand, i64::MAX - 5);
        assert!(wf.projections().purchases.list(tenant, None).is_empty());
        assert!(wf.projections().debts.list(tenant, None).is_empty());

        let rice_stock = StockItemId::for_outlet(rice, outlet).aggregate_id();
        let history = wf.dispatcher().store().load_stream(tenant, rice_stock).unwrap();
        let last: StockEvent = history.last().unwrap().to_envelope().decode().unwrap();
        let StockEvent::StockMoved(moved) = last else {
            panic!("expected a movement");
        };
        assert_eq!(moved.kind, MovementKind::Adjustment);
        assert_eq!(moved.quantity, -3);
        assert!(moved.reference.ends_with(":compensation"));
    }

    #[test]
    fn invalid_purchases_write_nothing() {
        let wf = workflows();
        let tenant = TenantId::new();
        let outlet = OutletId::new();
        let salt = create_product(&wf, tenant, "garam", 3_000, 2_000);
        let line = |quantity, unit: Option<&str>| PurchaseLine {
            product_id: salt,
            unit: unit.map(str::to_string),
            quantity,
            unit_cost: Money::new(2_000),
        };

        assert!(wf.purchase(tenant, input(outlet, vec![], 0)).is_err());
        assert!(wf.purchase(tenant, input(outlet, vec![line(0, None)], 0)).is_err());
        assert!(wf.purchase(tenant, input(outlet, vec![line(1, Some("sack"))], 0)).is_err());
        assert!(wf.purchase(tenant, input(outlet, vec![line(1, None)], 2_001)).is_err());
        assert!(wf.projections().stock.get(tenant, salt, outlet).is_none());
    }

    #[test]
    fn base_cost_rounds_half_up() {
        assert_eq!(per_unit(Money::new(10), 4), Money::new(3));
        assert_eq!(per_unit(Money::new(9), 4), Money::new(2));
    }
}
