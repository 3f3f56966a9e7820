//! Goods received from a supplier, kept as the source document for the
//! purchase journal entry.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tokoledger_accounting::{Fund, PurchasePosting};
use tokoledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, OutletId};
use tokoledger_events::Event;

use crate::product::ProductId;

pub const AGGREGATE_TYPE: &str = "inventory.purchase";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseId(pub AggregateId);

impl PurchaseId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One purchase line in base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedLine {
    pub product_id: ProductId,
    pub base_quantity: i64,
    pub base_cost: Money,
    /// What the supplier charged for the line.
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseDocument {
    pub purchase_id: Uuid,
    pub outlet_id: OutletId,
    pub supplier: String,
    pub lines: Vec<ReceivedLine>,
    pub total: Money,
    pub paid: Money,
    pub fund: Fund,
    pub unpaid: Money,
    pub due_date: Option<NaiveDate>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl PurchaseDocument {
    pub fn posting(&self) -> PurchasePosting {
        PurchasePosting {
            purchase_id: self.purchase_id,
            supplier: self.supplier.clone(),
            paid: self.paid,
            fund: self.fund,
            unpaid: self.unpaid,
            occurred_at: self.occurred_at,
        }
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.supplier.trim().is_empty() {
            return Err(DomainError::validation("supplier is required"));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("a purchase needs at least one line"));
        }
        if self.lines.iter().any(|l| l.base_quantity <= 0) {
            return Err(DomainError::validation("quantity must be positive"));
        }
        let lines_total = Money::checked_sum(self.lines.iter().map(|l| l.amount))
            .ok_or_else(|| DomainError::validation("purchase total out of range"))?;
        if lines_total != self.total {
            return Err(DomainError::invariant("purchase total does not match its lines"));
        }
        if self.paid.is_negative() || self.paid > self.total {
            return Err(DomainError::validation("paid amount must be between zero and the total"));
        }
        if self.paid.checked_add(self.unpaid) != Some(self.total) {
            return Err(DomainError::invariant("paid and unpaid must add up to the total"));
        }
        Ok(())
    }
}

/// Aggregate root: Purchase. Written once, after its stock is received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purchase {
    id: PurchaseId,
    document: Option<PurchaseDocument>,
    version: u64,
}

impl Purchase {
    pub fn empty(id: PurchaseId) -> Self {
        Self {
            id,
            document: None,
            version: 0,
        }
    }

    pub fn document(&self) -> Option<&PurchaseDocument> {
        self.document.as_ref()
    }
}

impl AggregateRoot for Purchase {
    type Id = PurchaseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPurchase {
    pub document: PurchaseDocument,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseCommand {
    RecordPurchase(RecordPurchase),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecorded {
    pub document: PurchaseDocument,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseEvent {
    PurchaseRecorded(PurchaseRecorded),
}

impl Event for PurchaseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseEvent::PurchaseRecorded(_) => "inventory.purchase.recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseEvent::PurchaseRecorded(e) => e.document.occurred_at,
        }
    }
}

impl Aggregate for Purchase {
    type Command = PurchaseCommand;
    type Event = PurchaseEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseEvent::PurchaseRecorded(e) => self.document = Some(e.document.clone()),
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseCommand::RecordPurchase(cmd) => {
                if self.document.is_some() {
                    return Err(DomainError::conflict("purchase already recorded"));
                }
                if cmd.document.purchase_id != *self.id.0.as_uuid() {
                    return Err(DomainError::invariant("purchase id does not match the stream"));
                }
                cmd.document.validate()?;
                Ok(vec![PurchaseEvent::PurchaseRecorded(PurchaseRecorded {
                    document: cmd.document.clone(),
                })])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokoledger_events::execute;

    fn document(purchase_id: Uuid, paid: i64) -> PurchaseDocument {
        PurchaseDocument {
            purchase_id,
            outlet_id: OutletId::new(),
            supplier: "CV Sumber Rejeki".into(),
            lines: vec![ReceivedLine {
                product_id: ProductId::new(AggregateId::new()),
                base_quantity: 20,
                base_cost: Money::new(9_500),
                amount: Money::new(190_000),
            }],
            total: Money::new(190_000),
            paid: Money::new(paid),
            fund: Fund::Bank,
            unpaid: Money::new(190_000 - paid),
            due_date: None,
            note: None,
            occurred_at: Utc::now(),
        }
    }

    fn record(document: PurchaseDocument) -> PurchaseCommand {
        PurchaseCommand::RecordPurchase(RecordPurchase { document })
    }

    #[test]
    fn records_once() {
        let uuid = Uuid::now_v7();
        let mut purchase = Purchase::empty(PurchaseId::new(AggregateId::from_uuid(uuid)));
        execute(&mut purchase, &record(document(uuid, 100_000))).unwrap();

        let posting = purchase.document().unwrap().posting();
        assert_eq!(posting.unpaid, Money::new(90_000));
        assert!(matches!(
            purchase.handle(&record(document(uuid, 100_000))),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn rejects_inconsistent_documents() {
        let uuid = Uuid::now_v7();
        let purchase = Purchase::empty(PurchaseId::new(AggregateId::from_uuid(uuid)));

        let foreign = record(document(Uuid::now_v7(), 0));
        assert!(matches!(purchase.handle(&foreign), Err(DomainError::InvariantViolation(_))));

        let mut overpaid = document(uuid, 0);
        overpaid.paid = Money::new(200_000);
        assert!(matches!(purchase.handle(&record(overpaid)), Err(DomainError::Validation(_))));

        let mut short = document(uuid, 0);
        short.total = Money::new(1_000);
        short.unpaid = Money::new(1_000);
        assert!(matches!(purchase.handle(&record(short)), Err(DomainError::InvariantViolation(_))));

        let mut empty = document(uuid, 0);
        empty.lines.clear();
        assert!(matches!(purchase.handle(&record(empty)), Err(DomainError::Validation(_))));
    }
}
