use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tokoledger_accounting::Fund;
use tokoledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money};
use tokoledger_events::Event;

pub const AGGREGATE_TYPE: &str = "receivables.debt";

/// Debt identifier (tenant-scoped by the event stream).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebtId(pub AggregateId);

impl DebtId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DebtId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Receivable: a customer owes us. Payable: we owe a supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebtKind {
    Receivable,
    Payable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebtStatus {
    Unpaid,
    Partial,
    Paid,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: Uuid,
    pub amount: Money,
    pub method: Fund,
    pub paid_at: DateTime<Utc>,
}

/// Aggregate root: Debt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Debt {
    id: DebtId,
    kind: DebtKind,
    party: String,
    amount: Money,
    due_date: Option<NaiveDate>,
    source_reference: Option<String>,
    status: DebtStatus,
    payments: Vec<Payment>,
    version: u64,
    created: bool,
}

impl Debt {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: DebtId) -> Self {
        Self {
            id,
            kind: DebtKind::Receivable,
            party: String::new(),
            amount: Money::ZERO,
            due_date: None,
            source_reference: None,
            status: DebtStatus::Unpaid,
            payments: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn kind(&self) -> DebtKind {
        self.kind
    }

    pub fn party(&self) -> &str {
        &self.party
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn source_reference(&self) -> Option<&str> {
        self.source_reference.as_deref()
    }

    pub fn status(&self) -> DebtStatus {
        self.status
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn paid(&self) -> Money {
        self.payments.iter().map(|p| p.amount).sum()
    }

    pub fn outstanding(&self) -> Money {
        if self.status == DebtStatus::Cancelled {
            return Money::ZERO;
        }
        self.amount - self.paid()
    }
}

impl AggregateRoot for Debt {
    type Id = DebtId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenDebt {
    pub kind: DebtKind,
    pub party: String,
    pub amount: Money,
    pub due_date: Option<NaiveDate>,
    /// Document that created the debt (`sale:<id>`, `purchase:<id>`).
    pub source_reference: Option<String>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub payment_id: Uuid,
    pub amount: Money,
    pub method: Fund,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelDebt {
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebtCommand {
    OpenDebt(OpenDebt),
    RecordPayment(RecordPayment),
    CancelDebt(CancelDebt),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtOpened {
    pub debt_id: DebtId,
    pub kind: DebtKind,
    pub party: String,
    pub amount: Money,
    pub due_date: Option<NaiveDate>,
    pub source_reference: Option<String>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub debt_id: DebtId,
    pub kind: DebtKind,
    pub payment_id: Uuid,
    pub amount: Money,
    pub method: Fund,
    pub outstanding_after: Money,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtCancelled {
    pub debt_id: DebtId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebtEvent {
    DebtOpened(DebtOpened),
    PaymentRecorded(PaymentRecorded),
    DebtCancelled(DebtCancelled),
}

impl Event for DebtEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DebtEvent::DebtOpened(_) => "receivables.debt.opened",
            DebtEvent::PaymentRecorded(_) => "receivables.debt.payment_recorded",
            DebtEvent::DebtCancelled(_) => "receivables.debt.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DebtEvent::DebtOpened(e) => e.occurred_at,
            DebtEvent::PaymentRecorded(e) => e.paid_at,
            DebtEvent::DebtCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Debt {
    type Command = DebtCommand;
    type Event = DebtEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DebtEvent::DebtOpened(e) => {
                self.id = e.debt_id;
                self.kind = e.kind;
                self.party = e.party.clone();
                self.amount = e.amount;
                self.due_date = e.due_date;
                self.source_reference = e.source_reference.clone();
                self.status = DebtStatus::Unpaid;
                self.created = true;
            }
            DebtEvent::PaymentRecorded(e) => {
                self.payments.push(Payment {
                    payment_id: e.payment_id,
                    amount: e.amount,
                    method: e.method,
                    paid_at: e.paid_at,
                });
                self.status = if e.outstanding_after.is_zero() {
                    DebtStatus::Paid
                } else {
                    DebtStatus::Partial
                };
            }
            DebtEvent::DebtCancelled(_) => {
                self.status = DebtStatus::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DebtCommand::OpenDebt(cmd) => self.handle_open(cmd),
            DebtCommand::RecordPayment(cmd) => self.handle_payment(cmd),
            DebtCommand::CancelDebt(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Debt {
    fn handle_open(&self, cmd: &OpenDebt) -> Result<Vec<DebtEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("debt already exists"));
        }
        if cmd.party.trim().is_empty() {
            return Err(DomainError::validation("party cannot be empty"));
        }
        if !cmd.amount.is_positive() {
            return Err(DomainError::validation("debt amount must be positive"));
        }
        Ok(vec![DebtEvent::DebtOpened(DebtOpened {
            debt_id: self.id,
            kind: cmd.kind,
            party: cmd.party.trim().to_string(),
            amount: cmd.amount,
            due_date: cmd.due_date,
            source_reference: cmd.source_reference.clone(),
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_payment(&self, cmd: &RecordPayment) -> Result<Vec<DebtEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        match self.status {
            DebtStatus::Cancelled => return Err(DomainError::invariant("debt is cancelled")),
            DebtStatus::Paid => return Err(DomainError::invariant("debt is already paid")),
            DebtStatus::Unpaid | DebtStatus::Partial => {}
        }
        if self.payments.iter().any(|p| p.payment_id == cmd.payment_id) {
            return Err(DomainError::conflict(format!(
                "payment {} already recorded",
                cmd.payment_id
            )));
        }
        if !cmd.amount.is_positive() {
            return Err(DomainError::validation("payment amount must be positive"));
        }

        let outstanding = self.outstanding();
        if cmd.amount > outstanding {
            return Err(DomainError::invariant(format!(
                "payment of {} exceeds outstanding {}",
                cmd.amount, outstanding
            )));
        }

        Ok(vec![DebtEvent::PaymentRecorded(PaymentRecorded {
            debt_id: self.id,
            kind: self.kind,
            payment_id: cmd.payment_id,
            amount: cmd.amount,
            method: cmd.method,
            outstanding_after: outstanding - cmd.amount,
            paid_at: cmd.paid_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelDebt) -> Result<Vec<DebtEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.status == DebtStatus::Cancelled {
            return Err(DomainError::conflict("debt already cancelled"));
        }
        if !self.payments.is_empty() {
            return Err(DomainError::invariant("cannot cancel a debt with payments"));
        }
        Ok(vec![DebtEvent::DebtCancelled(DebtCancelled {
            debt_id: self.id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
