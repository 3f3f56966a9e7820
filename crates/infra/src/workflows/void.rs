//! Voiding a completed sale.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use tokoledger_accounting::PostingSource;
use tokoledger_core::{DomainError, Money, TenantId};
use tokoledger_events::{EventBus, EventEnvelope};
use tokoledger_pos::{
    RecordShiftRefund, RegisterCommand, SaleCommand, SaleDocument, SaleId, VoidSale, register::AGGREGATE_TYPE as REGISTER,
    sale::AGGREGATE_TYPE as SALE,
};
use tokoledger_receivables::{CancelDebt, DebtCommand, DebtId, debt::AGGREGATE_TYPE as DEBT};

use crate::event_store::EventStore;
use crate::projections::DebtView;

use super::{PostingOutcome, WorkflowError, Workflows, debt_of, register_of, sale_of};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoidOutcome {
    pub sale_id: SaleId,
    /// Products whose stock was put back.
    pub stock_returned: usize,
    /// Cash paid back out of the open drawer.
    pub refunded_cash: Money,
    pub cancelled_debt: Option<DebtId>,
    pub journal: Option<PostingOutcome>,
    pub warnings: Vec<String>,
}

impl<S, B> Workflows<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Void → return stock → refund cash to the open shift → cancel the unpaid
    /// receivable → post the reversal.
    ///
    /// A sale whose receivable has taken payments cannot be voided. Past the
    /// void itself, later steps report warnings instead of failing the call.
    pub fn void_sale(
        &self,
        tenant_id: TenantId,
        sale_id: SaleId,
        reason: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<VoidOutcome, WorkflowError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("a void needs a reason").into());
        }
        let sale = self.sale(tenant_id, sale_id)?;
        let Some(document) = sale.document().cloned() else {
            return Err(WorkflowError::NotFound(format!("sale {sale_id}")));
        };
        let receivable = self
            .projections()
            .debts
            .by_source(tenant_id, &format!("sale:{}", document.sale_id));
        if receivable.as_ref().is_some_and(|d| !d.payments.is_empty()) {
            return Err(DomainError::conflict("sale has receivable payments").into());
        }
        let draws = document.stock_draws()?;

        self.execute(
            tenant_id,
            sale_id.0,
            SALE,
            SaleCommand::VoidSale(VoidSale {
                reason: reason.to_string(),
                occurred_at,
            }),
            sale_of,
        )?;

        let mut warnings = Vec::new();

        let mut stock_returned = 0;
        for draw in draws {
            let reference = format!("sale_void:{}", document.sale_id);
            match self.return_stock(tenant_id, document.outlet_id, &draw, reference, occurred_at) {
                Ok(()) => stock_returned += 1,
                Err(e) => {
                    warn!(%tenant_id, %sale_id, product_id = %draw.product_id, "stock not returned: {e}");
                    warnings.push(format!("stock for product {} not returned: {e}", draw.product_id));
                }
            }
        }

        let refunded_cash = self.refund_cash(tenant_id, &document, occurred_at, &mut warnings);
        let cancelled_debt = receivable
            .and_then(|debt| self.cancel_sale_receivable(tenant_id, &debt, reason, occurred_at, &mut warnings));

        let mut reversal = document.posting();
        reversal.occurred_at = occurred_at;
        let journal = self.post_or_warn(tenant_id, &PostingSource::SaleVoid(reversal), &mut warnings);

        info!(%tenant_id, %sale_id, receipt_no = %document.receipt_no, "sale voided");

        Ok(VoidOutcome {
            sale_id,
            stock_returned,
            refunded_cash,
            cancelled_debt,
            journal,
            warnings,
        })
    }

    fn refund_cash(
        &self,
        tenant_id: TenantId,
        document: &SaleDocument,
        occurred_at: DateTime<Utc>,
        warnings: &mut Vec<String>,
    ) -> Money {
        if !document.cash.is_positive() {
            return Money::ZERO;
        }
        let shift_id = match self.register(tenant_id, document.outlet_id) {
            Ok(register) => register.active_shift().map(|s| s.shift_id),
            Err(e) => {
                warnings.push(format!("register unavailable: {e}"));
                return Money::ZERO;
            }
        };
        let Some(shift_id) = shift_id else {
            warn!(%tenant_id, sale_id = %document.sale_id, "no open shift to refund cash from");
            warnings.push("no open shift: cash refund not recorded in a drawer".into());
            return Money::ZERO;
        };

        let refunded = self.execute(
            tenant_id,
            document.outlet_id.into(),
            REGISTER,
            RegisterCommand::RecordShiftRefund(RecordShiftRefund {
                shift_id,
                sale_id: document.sale_id,
                cash: document.cash,
                occurred_at,
            }),
            register_of,
        );
        match refunded {
            Ok(_) => document.cash,
            Err(e) => {
                warn!(%tenant_id, sale_id = %document.sale_id, "cash refund not recorded: {e}");
                warnings.push(format!("cash refund not recorded: {e}"));
                Money::ZERO
            }
        }
    }

    fn cancel_sale_receivable(
        &self,
        tenant_id: TenantId,
        debt: &DebtView,
        reason: &str,
        occurred_at: DateTime<Utc>,
        warnings: &mut Vec<String>,
    ) -> Option<DebtId> {
        let cancelled = self.execute(
            tenant_id,
            debt.debt_id.0,
            DEBT,
            DebtCommand::CancelDebt(CancelDebt {
                reason: format!("sale voided: {reason}"),
                occurred_at,
            }),
            debt_of,
        );
        match cancelled {
            Ok(_) => Some(debt.debt_id),
            Err(e) => {
                warn!(%tenant_id, debt_id = %debt.debt_id, "receivable not cancelled: {e}");
                warnings.push(format!("receivable {} not cancelled: {e}", debt.debt_id));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use tokoledger_accounting::{Fund, codes};
    use tokoledger_core::{AggregateId, Money, OutletId, TenantId, UserId};
    use tokoledger_pos::{OrderDiscount, SaleStatus, Tender, TenderMethod};
    use tokoledger_receivables::{DebtKind, DebtStatus};

    use super::*;
    use crate::workflows::testing::{create_product, open_shift, workflows};
    use crate::workflows::{CheckoutInput, CheckoutItem};

    fn sell(customer: Option<&str>, cash: i64) -> CheckoutInput {
        CheckoutInput {
            outlet_id: OutletId::new(),
            cashier: UserId::new(),
            items: vec![],
            order_discount: OrderDiscount::None,
            tenders: vec![Tender {
                method: TenderMethod::Cash,
                amount: Money::new(cash),
            }],
            customer: customer.map(str::to_string),
            due_date: None,
            receipt_no: None,
            allow_negative_stock: true,
            tax_bps: 0,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn void_unwinds_a_cash_sale() {
        let wf = workflows();
        let tenant = TenantId::new();
        let mut input = sell(None, 10_000);
        let outlet = input.outlet_id;
        let soap = create_product(&wf, tenant, "sabun", 5_000, 3_000);
        input.items.push(CheckoutItem {
            product_id: soap,
            unit: "pcs".into(),
            quantity: 2,
            discount: Money::ZERO,
        });
        let shift_id = open_shift(&wf, tenant, outlet, 50_000);
        let sold = wf.checkout(tenant, input).unwrap();
        let sale_id = SaleId::new(AggregateId::from_uuid(sold.sale.sale_id));

        let out = wf.void_sale(tenant, sale_id, "wrong item", Utc::now()).unwrap();
        assert!(out.warnings.is_empty(), "{:?}", out.warnings);
        assert_eq!(out.stock_returned, 1);
        assert_eq!(out.refunded_cash, Money::new(10_000));
        assert!(out.cancelled_debt.is_none());

        assert_eq!(wf.projections().stock.get(tenant, soap, outlet).unwrap().on_hand, 0);
        let shift = wf.projections().shifts.get(tenant, shift_id).unwrap();
        assert_eq!(shift.expected_cash(), Money::new(50_000));

        let view = wf.projections().sales.get(tenant, sale_id.0).unwrap();
        assert_eq!(view.status, SaleStatus::Voided);

        let tb = wf.projections().ledger.trial_balance(tenant);
        assert!(tb.is_balanced());
        assert_eq!(tb.balance(codes::CASH), Money::ZERO);
        assert_eq!(tb.balance(codes::SALES_REVENUE), Money::ZERO);
    }

    #[test]
    fn void_cancels_an_unpaid_receivable() {
        let wf = workflows();
        let tenant = TenantId::new();
        let mut input = sell(Some("Bu Ani"), 1_000);
        let outlet = input.outlet_id;
        let sugar = create_product(&wf, tenant, "gula", 15_000, 12_000);
        input.items.push(CheckoutItem {
            product_id: sugar,
            unit: "pcs".into(),
            quantity: 1,
            discount: Money::ZERO,
        });
        open_shift(&wf, tenant, outlet, 0);
        let sold = wf.checkout(tenant, input).unwrap();
        let debt_id = sold.debt_id.unwrap();

        let sale_id = SaleId::new(AggregateId::from_uuid(sold.sale.sale_id));
        let out = wf.void_sale(tenant, sale_id, "customer cancelled", Utc::now()).unwrap();
        assert_eq!(out.cancelled_debt, Some(debt_id));
        assert_eq!(wf.projections().debts.get(tenant, debt_id).unwrap().status, DebtStatus::Cancelled);
        assert_eq!(
            wf.projections().ledger.trial_balance(tenant).balance(codes::ACCOUNTS_RECEIVABLE),
            Money::ZERO
        );
    }

    #[test]
    fn void_is_refused_once_the_receivable_is_paid_into() {
        let wf = workflows();
        let tenant = TenantId::new();
        let mut input = sell(Some("Pak Budi"), 20_000);
        let outlet = input.outlet_id;
        let rice = create_product(&wf, tenant, "beras", 60_000, 50_000);
        input.items.push(CheckoutItem {
            product_id: rice,
            unit: "pcs".into(),
            quantity: 1,
            discount: Money::ZERO,
        });
        open_shift(&wf, tenant, outlet, 0);
        let sold = wf.checkout(tenant, input).unwrap();
        let debt_id = sold.debt_id.unwrap();
        wf.pay_debt(tenant, debt_id, Money::new(10_000), Fund::Cash, Utc::now()).unwrap();

        let sale_id = SaleId::new(AggregateId::from_uuid(sold.sale.sale_id));
        let err = wf.void_sale(tenant, sale_id, "customer cancelled", Utc::now()).unwrap_err();
        assert!(matches!(err, WorkflowError::Domain(DomainError::Conflict(_))), "{err:?}");

        let view = wf.projections().sales.get(tenant, sale_id.0).unwrap();
        assert_eq!(view.status, SaleStatus::Completed);
        assert_eq!(wf.projections().stock.get(tenant, rice, outlet).unwrap().on_hand, -1);

        let open: Money = wf
            .projections()
            .debts
            .list(tenant, Some(DebtKind::Receivable))
            .iter()
            .filter(|d| d.status != DebtStatus::Cancelled)
            .map(|d| d.outstanding)
            .sum();
        assert_eq!(open, Money::new(30_000));
        let tb = wf.projections().ledger.trial_balance(tenant);
        assert!(tb.is_balanced());
        assert_eq!(tb.balance(codes::ACCOUNTS_RECEIVABLE), open);
    }

    #[test]
    fn voiding_twice_conflicts() {
        let wf = workflows();
        let tenant = TenantId::new();
        let mut input = sell(None, 5_000);
        let outlet = input.outlet_id;
        let pen = create_product(&wf, tenant, "pulpen", 5_000, 2_000);
        input.items.push(CheckoutItem {
            product_id: pen,
            unit: "pcs".into(),
            quantity: 1,
            discount: Money::ZERO,
        });
        open_shift(&wf, tenant, outlet, 0);
        let sold = wf.checkout(tenant, input).unwrap();
        let sale_id = SaleId::new(AggregateId::from_uuid(sold.sale.sale_id));

        wf.void_sale(tenant, sale_id, "mistake", Utc::now()).unwrap();
        let err = wf.void_sale(tenant, sale_id, "mistake", Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Dispatch(crate::command_dispatcher::DispatchError::Conflict(_))
        ));
        assert!(wf.void_sale(tenant, sale_id, " ", Utc::now()).is_err());
    }
}
