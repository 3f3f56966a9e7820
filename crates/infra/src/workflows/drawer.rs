//! Opening a shift and moving cash in or out of the drawer.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;
use uuid::Uuid;

use tokoledger_core::{DomainError, Money, OutletId, TenantId, UserId};
use tokoledger_events::{EventBus, EventEnvelope};
use tokoledger_pos::{
    CashDirection, OpenShift, RecordCashMovement, RegisterCommand, ShiftState, register::AGGREGATE_TYPE as REGISTER,
};

use crate::event_store::EventStore;

use super::{WorkflowError, Workflows, register_of};

impl<S, B> Workflows<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn open_shift(
        &self,
        tenant_id: TenantId,
        outlet_id: OutletId,
        cashier: UserId,
        opening_cash: Money,
        occurred_at: DateTime<Utc>,
    ) -> Result<ShiftState, WorkflowError> {
        let shift_id = Uuid::now_v7();
        self.execute(
            tenant_id,
            outlet_id.into(),
            REGISTER,
            RegisterCommand::OpenShift(OpenShift {
                shift_id,
                cashier,
                opening_cash,
                occurred_at,
            }),
            register_of,
        )?;
        info!(%tenant_id, %outlet_id, %shift_id, %cashier, "shift opened");
        self.current_shift(tenant_id, outlet_id)
    }

    pub fn current_shift(&self, tenant_id: TenantId, outlet_id: OutletId) -> Result<ShiftState, WorkflowError> {
        self.register(tenant_id, outlet_id)?
            .active_shift()
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound(format!("open shift at outlet {outlet_id}")))
    }

    /// Petty cash paid out of, or float added to, the open shift's drawer.
    /// Drawer movements have no journal entry of their own.
    pub fn move_cash(
        &self,
        tenant_id: TenantId,
        outlet_id: OutletId,
        shift_id: Uuid,
        direction: CashDirection,
        amount: Money,
        note: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Result<ShiftState, WorkflowError> {
        if !amount.is_positive() {
            return Err(DomainError::validation("cash movement must be positive").into());
        }
        self.execute(
            tenant_id,
            outlet_id.into(),
            REGISTER,
            RegisterCommand::RecordCashMovement(RecordCashMovement {
                shift_id,
                direction,
                amount,
                note,
                occurred_at,
            }),
            register_of,
        )?;
        self.current_shift(tenant_id, outlet_id)
    }
}
