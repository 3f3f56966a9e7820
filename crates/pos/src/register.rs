//! Cash register: the shift state machine of one outlet.
//!
//! A register stream is keyed by the outlet id. At most one shift is open at
//! a time; closing a shift freezes its summary into the history.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tokoledger_core::{Aggregate, AggregateRoot, DomainError, Money, OutletId, UserId};
use tokoledger_events::Event;

pub const AGGREGATE_TYPE: &str = "pos.register";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CashDirection {
    In,
    Out,
}

/// Running totals of the open shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftState {
    pub shift_id: Uuid,
    pub cashier: UserId,
    pub opened_at: DateTime<Utc>,
    pub opening_cash: Money,
    pub cash_sales: Money,
    pub non_cash_sales: Money,
    pub cash_refunds: Money,
    pub cash_in: Money,
    pub cash_out: Money,
    pub sales: BTreeSet<Uuid>,
    pub refunds: BTreeSet<Uuid>,
}

impl ShiftState {
    /// opening + cash sales − cash refunds + cash in − cash out
    pub fn expected_cash(&self) -> Money {
        self.opening_cash + self.cash_sales - self.cash_refunds + self.cash_in - self.cash_out
    }

    /// [`ShiftState::expected_cash`] after `cash` more comes in, if it fits.
    fn expected_cash_with(&self, cash: Money) -> Option<Money> {
        self.opening_cash
            .checked_add(self.cash_sales)?
            .checked_sub(self.cash_refunds)?
            .checked_add(self.cash_in)?
            .checked_sub(self.cash_out)?
            .checked_add(cash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedShift {
    #[serde(flatten)]
    pub shift: ShiftState,
    pub closed_at: DateTime<Utc>,
    pub expected_cash: Money,
    pub counted_cash: Money,
    /// counted − expected; negative means short.
    pub variance: Money,
    pub note: Option<String>,
}

/// Aggregate root: Register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    id: OutletId,
    active: Option<ShiftState>,
    closed: Vec<ClosedShift>,
    version: u64,
}

impl Register {
    pub fn empty(id: OutletId) -> Self {
        Self {
            id,
            active: None,
            closed: Vec::new(),
            version: 0,
        }
    }

    pub fn active_shift(&self) -> Option<&ShiftState> {
        self.active.as_ref()
    }

    pub fn closed_shifts(&self) -> &[ClosedShift] {
        &self.closed
    }

    fn open_shift(&self, shift_id: Uuid) -> Result<&ShiftState, DomainError> {
        match &self.active {
            Some(s) if s.shift_id == shift_id => Ok(s),
            Some(s) => Err(DomainError::conflict(format!(
                "shift {shift_id} is not the open shift ({})",
                s.shift_id
            ))),
            None if self.closed.iter().any(|c| c.shift.shift_id == shift_id) => {
                Err(DomainError::conflict(format!("shift {shift_id} is closed")))
            }
            None => Err(DomainError::conflict("no shift is open")),
        }
    }
}

impl AggregateRoot for Register {
    type Id = OutletId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenShift {
    pub shift_id: Uuid,
    pub cashier: UserId,
    pub opening_cash: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordShiftSale {
    pub shift_id: Uuid,
    pub sale_id: Uuid,
    pub cash: Money,
    pub non_cash: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordShiftRefund {
    pub shift_id: Uuid,
    pub sale_id: Uuid,
    pub cash: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCashMovement {
    pub shift_id: Uuid,
    pub direction: CashDirection,
    pub amount: Money,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseShift {
    pub shift_id: Uuid,
    pub counted_cash: Money,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterCommand {
    OpenShift(OpenShift),
    RecordShiftSale(RecordShiftSale),
    RecordShiftRefund(RecordShiftRefund),
    RecordCashMovement(RecordCashMovement),
    CloseShift(CloseShift),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftOpened {
    pub outlet_id: OutletId,
    pub shift_id: Uuid,
    pub cashier: UserId,
    pub opening_cash: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftSaleRecorded {
    pub outlet_id: OutletId,
    pub shift_id: Uuid,
    pub sale_id: Uuid,
    pub cash: Money,
    pub non_cash: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftRefundRecorded {
    pub outlet_id: OutletId,
    pub shift_id: Uuid,
    pub sale_id: Uuid,
    pub cash: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashMoved {
    pub outlet_id: OutletId,
    pub shift_id: Uuid,
    pub direction: CashDirection,
    pub amount: Money,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftClosed {
    pub outlet_id: OutletId,
    pub shift_id: Uuid,
    pub expected_cash: Money,
    pub counted_cash: Money,
    pub variance: Money,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterEvent {
    ShiftOpened(ShiftOpened),
    ShiftSaleRecorded(ShiftSaleRecorded),
    ShiftRefundRecorded(ShiftRefundRecorded),
    CashMoved(CashMoved),
    ShiftClosed(ShiftClosed),
}

impl Event for RegisterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RegisterEvent::ShiftOpened(_) => "pos.register.shift_opened",
            RegisterEvent::ShiftSaleRecorded(_) => "pos.register.sale_recorded",
            RegisterEvent::ShiftRefundRecorded(_) => "pos.register.refund_recorded",
            RegisterEvent::CashMoved(_) => "pos.register.cash_moved",
            RegisterEvent::ShiftClosed(_) => "pos.register.shift_closed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RegisterEvent::ShiftOpened(e) => e.occurred_at,
            RegisterEvent::ShiftSaleRecorded(e) => e.occurred_at,
            RegisterEvent::ShiftRefundRecorded(e) => e.occurred_at,
            RegisterEvent::CashMoved(e) => e.occurred_at,
            RegisterEvent::ShiftClosed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Register {
    type Command = RegisterCommand;
    type Event = RegisterEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RegisterEvent::ShiftOpened(e) => {
                self.active = Some(ShiftState {
                    shift_id: e.shift_id,
                    cashier: e.cashier,
                    opened_at: e.occurred_at,
                    opening_cash: e.opening_cash,
                    cash_sales: Money::ZERO,
                    non_cash_sales: Money::ZERO,
                    cash_refunds: Money::ZERO,
                    cash_in: Money::ZERO,
                    cash_out: Money::ZERO,
                    sales: BTreeSet::new(),
                    refunds: BTreeSet::new(),
                });
            }
            RegisterEvent::ShiftSaleRecorded(e) => {
                if let Some(s) = self.active.as_mut() {
                    s.cash_sales += e.cash;
                    s.non_cash_sales += e.non_cash;
                    s.sales.insert(e.sale_id);
                }
            }
            RegisterEvent::ShiftRefundRecorded(e) => {
                if let Some(s) = self.active.as_mut() {
                    s.cash_refunds += e.cash;
                    s.refunds.insert(e.sale_id);
                }
            }
            RegisterEvent::CashMoved(e) => {
                if let Some(s) = self.active.as_mut() {
                    match e.direction {
                        CashDirection::In => s.cash_in += e.amount,
                        CashDirection::Out => s.cash_out += e.amount,
                    }
                }
            }
            RegisterEvent::ShiftClosed(e) => {
                if let Some(shift) = self.active.take() {
                    self.closed.push(ClosedShift {
                        shift,
                        closed_at: e.occurred_at,
                        expected_cash: e.expected_cash,
                        counted_cash: e.counted_cash,
                        variance: e.variance,
                        note: e.note.clone(),
                    });
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RegisterCommand::OpenShift(cmd) => self.handle_open(cmd),
            RegisterCommand::RecordShiftSale(cmd) => self.handle_sale(cmd),
            RegisterCommand::RecordShiftRefund(cmd) => self.handle_refund(cmd),
            RegisterCommand::RecordCashMovement(cmd) => self.handle_cash(cmd),
            RegisterCommand::CloseShift(cmd) => self.handle_close(cmd),
        }
    }
}

impl Register {
    fn handle_open(&self, cmd: &OpenShift) -> Result<Vec<RegisterEvent>, DomainError> {
        if let Some(s) = &self.active {
            return Err(DomainError::conflict(format!(
                "shift {} is already open at this outlet",
                s.shift_id
            )));
        }
        if self.closed.iter().any(|c| c.shift.shift_id == cmd.shift_id) {
            return Err(DomainError::conflict("shift id already used"));
        }
        if cmd.opening_cash.is_negative() {
            return Err(DomainError::validation("opening cash cannot be negative"));
        }
        Ok(vec![RegisterEvent::ShiftOpened(ShiftOpened {
            outlet_id: self.id,
            shift_id: cmd.shift_id,
            cashier: cmd.cashier,
            opening_cash: cmd.opening_cash,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_sale(&self, cmd: &RecordShiftSale) -> Result<Vec<RegisterEvent>, DomainError> {
        let shift = self.open_shift(cmd.shift_id)?;
        if cmd.cash.is_negative() || cmd.non_cash.is_negative() {
            return Err(DomainError::validation("sale amounts cannot be negative"));
        }
        if shift.sales.contains(&cmd.sale_id) {
            return Ok(vec![]);
        }
        let fits = shift.cash_sales.checked_add(cmd.cash).is_some()
            && shift.non_cash_sales.checked_add(cmd.non_cash).is_some()
            && shift.expected_cash_with(cmd.cash).is_some();
        if !fits {
            return Err(DomainError::validation("shift totals out of range"));
        }
        Ok(vec![RegisterEvent::ShiftSaleRecorded(ShiftSaleRecorded {
            outlet_id: self.id,
            shift_id: cmd.shift_id,
            sale_id: cmd.sale_id,
            cash: cmd.cash,
            non_cash: cmd.non_cash,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_refund(&self, cmd: &RecordShiftRefund) -> Result<Vec<RegisterEvent>, DomainError> {
        let shift = self.open_shift(cmd.shift_id)?;
        if cmd.cash.is_negative() {
            return Err(DomainError::validation("refund cannot be negative"));
        }
        if shift.refunds.contains(&cmd.sale_id) {
            return Ok(vec![]);
        }
        Ok(vec![RegisterEvent::ShiftRefundRecorded(ShiftRefundRecorded {
            outlet_id: self.id,
            shift_id: cmd.shift_id,
            sale_id: cmd.sale_id,
            cash: cmd.cash,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cash(&self, cmd: &RecordCashMovement) -> Result<Vec<RegisterEvent>, DomainError> {
        let shift = self.open_shift(cmd.shift_id)?;
        if !cmd.amount.is_positive() {
            return Err(DomainError::validation("amount must be positive"));
        }
        if cmd.direction == CashDirection::In && shift.expected_cash_with(cmd.amount).is_none() {
            return Err(DomainError::validation("shift totals out of range"));
        }
        if cmd.direction == CashDirection::Out && cmd.amount > shift.expected_cash() {
            return Err(DomainError::invariant(format!(
                "cannot take out {} with {} in the drawer",
                cmd.amount,
                shift.expected_cash()
            )));
        }
        Ok(vec![RegisterEvent::CashMoved(CashMoved {
            outlet_id: self.id,
            shift_id: cmd.shift_id,
            direction: cmd.direction,
            amount: cmd.amount,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close(&self, cmd: &CloseShift) -> Result<Vec<RegisterEvent>, DomainError> {
        let shift = self.open_shift(cmd.shift_id)?;
        if cmd.counted_cash.is_negative() {
            return Err(DomainError::validation("counted cash cannot be negative"));
        }
        let expected_cash = shift.expected_cash();
        let variance = cmd
            .counted_cash
            .checked_sub(expected_cash)
            .ok_or_else(|| DomainError::validation("counted cash out of range"))?;
        Ok(vec![RegisterEvent::ShiftClosed(ShiftClosed {
            outlet_id: self.id,
            shift_id: cmd.shift_id,
            expected_cash,
            counted_cash: cmd.counted_cash,
            variance,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokoledger_events::execute;

    fn open(register: &mut Register, opening: i64) -> Uuid {
        let shift_id = Uuid::now_v7();
        execute(
            register,
            &RegisterCommand::OpenShift(OpenShift {
                shift_id,
                cashier: UserId::new(),
                opening_cash: Money::new(opening),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        shift_id
    }

    fn sale(shift_id: Uuid, sale_id: Uuid, cash: i64, non_cash: i64) -> RegisterCommand {
        RegisterCommand::RecordShiftSale(RecordShiftSale {
            shift_id,
            sale_id,
            cash: Money::new(cash),
            non_cash: Money::new(non_cash),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn only_one_open_shift_per_outlet() {
        let mut register = Register::empty(OutletId::new());
        open(&mut register, 100_000);

        let err = register
            .handle(&RegisterCommand::OpenShift(OpenShift {
                shift_id: Uuid::now_v7(),
                cashier: UserId::new(),
                opening_cash: Money::ZERO,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn close_computes_expected_and_variance() {
        let mut register = Register::empty(OutletId::new());
        let shift_id = open(&mut register, 100_000);

        let s1 = Uuid::now_v7();
        execute(&mut register, &sale(shift_id, s1, 50_000, 20_000)).unwrap();
        execute(
            &mut register,
            &RegisterCommand::RecordShiftRefund(RecordShiftRefund {
                shift_id,
                sale_id: s1,
                cash: Money::new(10_000),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        for (direction, amount) in [(CashDirection::In, 5_000), (CashDirection::Out, 25_000)] {
            execute(
                &mut register,
                &RegisterCommand::RecordCashMovement(RecordCashMovement {
                    shift_id,
                    direction,
                    amount: Money::new(amount),
                    note: None,
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap();
        }
        assert_eq!(register.active_shift().unwrap().expected_cash(), Money::new(120_000));

        let events = execute(
            &mut register,
            &RegisterCommand::CloseShift(CloseShift {
                shift_id,
                counted_cash: Money::new(118_000),
                note: Some("short".into()),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        let RegisterEvent::ShiftClosed(closed) = &events[0] else {
            panic!("expected close");
        };
        assert_eq!(closed.expected_cash, Money::new(120_000));
        assert_eq!(closed.variance, Money::new(-2_000));
        assert!(register.active_shift().is_none());
        assert_eq!(register.closed_shifts().len(), 1);
        assert_eq!(register.closed_shifts()[0].shift.non_cash_sales, Money::new(20_000));
    }

    #[test]
    fn drawer_cannot_overflow() {
        let mut register = Register::empty(OutletId::new());
        let shift_id = open(&mut register, i64::MAX - 1_000);

        let err = register.handle(&sale(shift_id, Uuid::now_v7(), 5_000, 0)).unwrap_err();
        assert_eq!(err, DomainError::validation("shift totals out of range"));
        execute(&mut register, &sale(shift_id, Uuid::now_v7(), 1_000, 0)).unwrap();
        assert_eq!(register.active_shift().unwrap().expected_cash(), Money::new(i64::MAX));
    }

    #[test]
    fn cash_out_is_limited_to_drawer() {
        let mut register = Register::empty(OutletId::new());
        let shift_id = open(&mut register, 10_000);
        let err = register
            .handle(&RegisterCommand::RecordCashMovement(RecordCashMovement {
                shift_id,
                direction: CashDirection::Out,
                amount: Money::new(10_001),
                note: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn commands_for_other_or_closed_shift_are_rejected() {
        let mut register = Register::empty(OutletId::new());
        assert!(matches!(
            register.handle(&sale(Uuid::now_v7(), Uuid::now_v7(), 1, 0)),
            Err(DomainError::Conflict(_))
        ));

        let shift_id = open(&mut register, 0);
        assert!(register.handle(&sale(Uuid::now_v7(), Uuid::now_v7(), 1, 0)).is_err());

        execute(
            &mut register,
            &RegisterCommand::CloseShift(CloseShift {
                shift_id,
                counted_cash: Money::ZERO,
                note: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(register.handle(&sale(shift_id, Uuid::now_v7(), 1, 0)).is_err());
    }

    #[test]
    fn recording_the_same_sale_twice_is_a_no_op() {
        let mut register = Register::empty(OutletId::new());
        let shift_id = open(&mut register, 0);
        let sale_id = Uuid::now_v7();
        execute(&mut register, &sale(shift_id, sale_id, 1_000, 0)).unwrap();
        assert!(execute(&mut register, &sale(shift_id, sale_id, 1_000, 0)).unwrap().is_empty());
        assert_eq!(register.active_shift().unwrap().cash_sales, Money::new(1_000));
    }
}
