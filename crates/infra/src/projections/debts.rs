//! Receivables and payables read model with aging.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use tokoledger_accounting::{PaymentPosting, PostingSource};
use tokoledger_core::{AggregateId, Money, TenantId};
use tokoledger_events::EventEnvelope;
use tokoledger_receivables::{
    AgingBucket, AgingReport, DebtEvent, DebtId, DebtKind, DebtStatus, Payment, aging, debt::AGGREGATE_TYPE,
};

use crate::read_model::{InMemoryTenantStore, TenantStore};

use super::{ProjectionError, StreamCursors, decode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebtView {
    pub debt_id: DebtId,
    pub kind: DebtKind,
    pub party: String,
    pub amount: Money,
    pub paid: Money,
    pub outstanding: Money,
    pub due_date: Option<NaiveDate>,
    pub status: DebtStatus,
    pub source_reference: Option<String>,
    pub note: Option<String>,
    pub payments: Vec<Payment>,
    pub opened_at: DateTime<Utc>,
}

impl DebtView {
    pub fn aging(&self, today: NaiveDate) -> Option<AgingBucket> {
        aging(self.outstanding, self.due_date, today)
    }

    pub fn posting_sources(&self) -> Vec<PostingSource> {
        self.payments
            .iter()
            .map(|p| {
                let posting = PaymentPosting {
                    payment_id: p.payment_id,
                    debt_id: *self.debt_id.0.as_uuid(),
                    fund: p.method,
                    amount: p.amount,
                    occurred_at: p.paid_at,
                };
                match self.kind {
                    DebtKind::Receivable => PostingSource::ReceivablePayment(posting),
                    DebtKind::Payable => PostingSource::PayablePayment(posting),
                }
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct DebtsProjection<S = InMemoryTenantStore<AggregateId, DebtView>> {
    store: S,
    cursors: StreamCursors,
}

impl Default for DebtsProjection {
    fn default() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl<S> DebtsProjection<S>
where
    S: TenantStore<AggregateId, DebtView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, debt_id: DebtId) -> Option<DebtView> {
        self.store.get(tenant_id, &debt_id.0)
    }

    /// Open debts first, then by due date (undated last), then by party.
    pub fn list(&self, tenant_id: TenantId, kind: Option<DebtKind>) -> Vec<DebtView> {
        let mut debts: Vec<DebtView> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|d| kind.is_none_or(|k| d.kind == k))
            .collect();
        debts.sort_by(|a, b| {
            (!a.outstanding.is_positive(), a.due_date.is_none(), a.due_date, &a.party, a.opened_at).cmp(&(
                !b.outstanding.is_positive(),
                b.due_date.is_none(),
                b.due_date,
                &b.party,
                b.opened_at,
            ))
        });
        debts
    }

    /// Debt linked to a source document, e.g. `sale:<id>`.
    pub fn by_source(&self, tenant_id: TenantId, source_reference: &str) -> Option<DebtView> {
        self.store
            .list(tenant_id)
            .into_iter()
            .find(|d| d.source_reference.as_deref() == Some(source_reference))
    }

    pub fn aging(&self, tenant_id: TenantId, kind: DebtKind, today: NaiveDate) -> AgingReport {
        let mut report = AgingReport::default();
        for debt in self.store.list(tenant_id).into_iter().filter(|d| d.kind == kind) {
            report.add(debt.outstanding, debt.due_date, today);
        }
        report
    }

    pub fn posting_sources(&self, tenant_id: TenantId) -> Vec<PostingSource> {
        let mut sources: Vec<PostingSource> = self
            .store
            .list(tenant_id)
            .iter()
            .flat_map(DebtView::posting_sources)
            .collect();
        sources.sort_by_key(|s| match s {
            PostingSource::ReceivablePayment(p) | PostingSource::PayablePayment(p) => p.occurred_at,
            _ => DateTime::<Utc>::MIN_UTC,
        });
        sources
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }
        self.cursors.apply_once(envelope, || {
            let tenant_id = envelope.tenant_id();
            let key = envelope.aggregate_id();
            match decode::<DebtEvent>(envelope)? {
                DebtEvent::DebtOpened(e) => self.store.upsert(
                    tenant_id,
                    key,
                    DebtView {
                        debt_id: e.debt_id,
                        kind: e.kind,
                        party: e.party,
                        amount: e.amount,
                        paid: Money::ZERO,
                        outstanding: e.amount,
                        due_date: e.due_date,
                        status: DebtStatus::Unpaid,
                        source_reference: e.source_reference,
                        note: e.note,
                        payments: Vec::new(),
                        opened_at: e.occurred_at,
                    },
                ),
                DebtEvent::PaymentRecorded(e) => {
                    if let Some(mut view) = self.store.get(tenant_id, &key) {
                        view.paid += e.amount;
                        view.outstanding = e.outstanding_after;
                        view.status = if e.outstanding_after.is_positive() {
                            DebtStatus::Partial
                        } else {
                            DebtStatus::Paid
                        };
                        view.payments.push(Payment {
                            payment_id: e.payment_id,
                            amount: e.amount,
                            method: e.method,
                            paid_at: e.paid_at,
                        });
                        self.store.upsert(tenant_id, key, view);
                    }
                }
                DebtEvent::DebtCancelled(_) => {
                    if let Some(mut view) = self.store.get(tenant_id, &key) {
                        view.status = DebtStatus::Cancelled;
                        view.outstanding = Money::ZERO;
                        self.store.upsert(tenant_id, key, view);
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
