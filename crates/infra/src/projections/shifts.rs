//! Cashier shifts per outlet, open and closed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use tokoledger_accounting::{PostingSource, ShiftVariancePosting};
use tokoledger_core::{Money, OutletId, TenantId, UserId};
use tokoledger_events::EventEnvelope;
use tokoledger_pos::{CashDirection, RegisterEvent, register::AGGREGATE_TYPE};

use crate::read_model::{InMemoryTenantStore, TenantStore};

use super::{ProjectionError, StreamCursors, decode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShiftClosing {
    pub closed_at: DateTime<Utc>,
    pub expected_cash: Money,
    pub counted_cash: Money,
    pub variance: Money,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShiftView {
    pub outlet_id: OutletId,
    pub shift_id: Uuid,
    pub cashier: UserId,
    pub opened_at: DateTime<Utc>,
    pub opening_cash: Money,
    pub cash_sales: Money,
    pub non_cash_sales: Money,
    pub cash_refunds: Money,
    pub cash_in: Money,
    pub cash_out: Money,
    pub sale_count: u32,
    pub closing: Option<ShiftClosing>,
}

impl ShiftView {
    pub fn is_open(&self) -> bool {
        self.closing.is_none()
    }

    pub fn expected_cash(&self) -> Money {
        self.opening_cash + self.cash_sales - self.cash_refunds + self.cash_in - self.cash_out
    }

    pub fn posting_source(&self) -> Option<PostingSource> {
        let closing = self.closing.as_ref()?;
        Some(PostingSource::ShiftVariance(ShiftVariancePosting {
            shift_id: self.shift_id,
            variance: closing.variance,
            occurred_at: closing.closed_at,
        }))
    }
}

/// Shifts are keyed by shift id; the register stream is the outlet.
#[derive(Debug)]
pub struct ShiftsProjection<S = InMemoryTenantStore<Uuid, ShiftView>> {
    store: S,
    cursors: StreamCursors,
}

impl Default for ShiftsProjection {
    fn default() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl<S> ShiftsProjection<S>
where
    S: TenantStore<Uuid, ShiftView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, shift_id: Uuid) -> Option<ShiftView> {
        self.store.get(tenant_id, &shift_id)
    }

    /// Newest first.
    pub fn for_outlet(&self, tenant_id: TenantId, outlet_id: OutletId) -> Vec<ShiftView> {
        let mut shifts: Vec<ShiftView> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|s| s.outlet_id == outlet_id)
            .collect();
        shifts.sort_by(|a, b| b.opened_at.cmp(&a.opened_at));
        shifts
    }

    pub fn posting_sources(&self, tenant_id: TenantId) -> Vec<PostingSource> {
        let mut shifts = self.store.list(tenant_id);
        shifts.sort_by_key(|s| s.opened_at);
        shifts.iter().filter_map(ShiftView::posting_source).collect()
    }

    fn modify(&self, tenant_id: TenantId, shift_id: Uuid, f: impl FnOnce(&mut ShiftView)) {
        if let Some(mut view) = self.store.get(tenant_id, &shift_id) {
            f(&mut view);
            self.store.upsert(tenant_id, shift_id, view);
        }
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }
        self.cursors.apply_once(envelope, || {
            let tenant_id = envelope.tenant_id();
            match decode::<RegisterEvent>(envelope)? {
                RegisterEvent::ShiftOpened(e) => self.store.upsert(
                    tenant_id,
                    e.shift_id,
                    ShiftView {
                        outlet_id: e.outlet_id,
                        shift_id: e.shift_id,
                        cashier: e.cashier,
                        opened_at: e.occurred_at,
                        opening_cash: e.opening_cash,
                        cash_sales: Money::ZERO,
                        non_cash_sales: Money::ZERO,
                        cash_refunds: Money::ZERO,
                        cash_in: Money::ZERO,
                        cash_out: Money::ZERO,
                        sale_count: 0,
                        closing: None,
                    },
                ),
                RegisterEvent::ShiftSaleRecorded(e) => self.modify(tenant_id, e.shift_id, |s| {
                    s.cash_sales += e.cash;
                    s.non_cash_sales += e.non_cash;
                    s.sale_count += 1;
                }),
                RegisterEvent::ShiftRefundRecorded(e) => {
                    self.modify(tenant_id, e.shift_id, |s| s.cash_refunds += e.cash)
                }
                RegisterEvent::CashMoved(e) => self.modify(tenant_id, e.shift_id, |s| match e.direction {
                    CashDirection::In => s.cash_in += e.amount,
                    CashDirection::Out => s.cash_out += e.amount,
                }),
                RegisterEvent::ShiftClosed(e) => self.modify(tenant_id, e.shift_id, |s| {
                    s.closing = Some(ShiftClosing {
                        closed_at: e.occurred_at,
                        expected_cash: e.expected_cash,
                        counted_cash: e.counted_cash,
                        variance: e.variance,
                        note: e.note,
                    });
                }),
            }
            Ok(())
        })
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        self.cursors.clear_tenant(tenant_id);
        self.store.clear_tenant(tenant_id);
    }
}

