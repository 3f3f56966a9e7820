//! Debt payments and shift closing: one business write, then its journal entry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::info;
use uuid::Uuid;

use tokoledger_accounting::{Fund, PaymentPosting, PostingSource, ShiftVariancePosting};
use tokoledger_core::{Money, OutletId, TenantId};
use tokoledger_events::{EventBus, EventEnvelope};
use tokoledger_pos::{CloseShift, RegisterCommand, register::AGGREGATE_TYPE as REGISTER};
use tokoledger_receivables::{DebtCommand, DebtId, DebtKind, DebtStatus, RecordPayment, debt::AGGREGATE_TYPE as DEBT};

use crate::event_store::EventStore;

use super::{PostingOutcome, WorkflowError, Workflows, debt_of, register_of};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentOutcome {
    pub debt_id: DebtId,
    pub payment_id: Uuid,
    pub outstanding: Money,
    pub status: DebtStatus,
    pub journal: Option<PostingOutcome>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseShiftOutcome {
    pub shift_id: Uuid,
    pub expected_cash: Money,
    pub counted_cash: Money,
    /// counted − expected.
    pub variance: Money,
    pub journal: Option<PostingOutcome>,
    pub warnings: Vec<String>,
}

impl<S, B> Workflows<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn pay_debt(
        &self,
        tenant_id: TenantId,
        debt_id: DebtId,
        amount: Money,
        fund: Fund,
        paid_at: DateTime<Utc>,
    ) -> Result<PaymentOutcome, WorkflowError> {
        let kind = self.debt(tenant_id, debt_id)?.kind();

        let payment_id = Uuid::now_v7();
        self.execute(
            tenant_id,
            debt_id.0,
            DEBT,
            DebtCommand::RecordPayment(RecordPayment {
                payment_id,
                amount,
                method: fund,
                paid_at,
            }),
            debt_of,
        )?;
        let debt = self.debt(tenant_id, debt_id)?;

        let posting = PaymentPosting {
            payment_id,
            debt_id: *debt_id.0.as_uuid(),
            fund,
            amount,
            occurred_at: paid_at,
        };
        let source = match kind {
            DebtKind::Receivable => PostingSource::ReceivablePayment(posting),
            DebtKind::Payable => PostingSource::PayablePayment(posting),
        };
        let mut warnings = Vec::new();
        let journal = self.post_or_warn(tenant_id, &source, &mut warnings);

        info!(%tenant_id, %debt_id, %amount, outstanding = %debt.outstanding(), "payment recorded");

        Ok(PaymentOutcome {
            debt_id,
            payment_id,
            outstanding: debt.outstanding(),
            status: debt.status(),
            journal,
            warnings,
        })
    }

    pub fn close_shift(
        &self,
        tenant_id: TenantId,
        outlet_id: OutletId,
        shift_id: Uuid,
        counted_cash: Money,
        note: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Result<CloseShiftOutcome, WorkflowError> {
        self.execute(
            tenant_id,
            outlet_id.into(),
            REGISTER,
            RegisterCommand::CloseShift(CloseShift {
                shift_id,
                counted_cash,
                note,
                occurred_at,
            }),
            register_of,
        )?;

        let register = self.register(tenant_id, outlet_id)?;
        let Some(closed) = register
            .closed_shifts()
            .iter()
            .rev()
            .find(|c| c.shift.shift_id == shift_id)
        else {
            return Err(WorkflowError::NotFound(format!("closed shift {shift_id}")));
        };

        let source = PostingSource::ShiftVariance(ShiftVariancePosting {
            shift_id,
            variance: closed.variance,
            occurred_at: closed.closed_at,
        });
        let mut warnings = Vec::new();
        let journal = self.post_or_warn(tenant_id, &source, &mut warnings);

        info!(%tenant_id, %outlet_id, %shift_id, variance = %closed.variance, "shift closed");

        Ok(CloseShiftOutcome {
            shift_id,
            expected_cash: closed.expected_cash,
            counted_cash: closed.counted_cash,
            variance: closed.variance,
            journal,
            warnings,
        })
    }
}
