use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tokoledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use tokoledger_events::Event;

use crate::checkout::SaleDocument;

pub const AGGREGATE_TYPE: &str = "pos.sale";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaleId(pub AggregateId);

impl SaleId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SaleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Completed,
    Voided,
}

/// Aggregate root: Sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sale {
    id: SaleId,
    document: Option<SaleDocument>,
    status: SaleStatus,
    void_reason: Option<String>,
    version: u64,
}

impl Sale {
    pub fn empty(id: SaleId) -> Self {
        Self {
            id,
            document: None,
            status: SaleStatus::Completed,
            void_reason: None,
            version: 0,
        }
    }

    pub fn document(&self) -> Option<&SaleDocument> {
        self.document.as_ref()
    }

    pub fn status(&self) -> SaleStatus {
        self.status
    }

    pub fn void_reason(&self) -> Option<&str> {
        self.void_reason.as_deref()
    }
}

impl AggregateRoot for Sale {
    type Id = SaleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSale {
    pub document: SaleDocument,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidSale {
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleCommand {
    RecordSale(RecordSale),
    VoidSale(VoidSale),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecorded {
    pub document: SaleDocument,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleVoided {
    pub sale_id: SaleId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleEvent {
    SaleRecorded(SaleRecorded),
    SaleVoided(SaleVoided),
}

impl Event for SaleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SaleEvent::SaleRecorded(_) => "pos.sale.recorded",
            SaleEvent::SaleVoided(_) => "pos.sale.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SaleEvent::SaleRecorded(e) => e.document.occurred_at,
            SaleEvent::SaleVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Sale {
    type Command = SaleCommand;
    type Event = SaleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SaleEvent::SaleRecorded(e) => {
                self.document = Some(e.document.clone());
                self.status = SaleStatus::Completed;
            }
            SaleEvent::SaleVoided(e) => {
                self.status = SaleStatus::Voided;
                self.void_reason = Some(e.reason.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SaleCommand::RecordSale(cmd) => {
                if self.document.is_some() {
                    return Err(DomainError::conflict("sale already recorded"));
                }
                if cmd.document.sale_id != *self.id.0.as_uuid() {
                    return Err(DomainError::invariant("sale id does not match the stream"));
                }
                if cmd.document.lines.is_empty() {
                    return Err(DomainError::validation("sale has no lines"));
                }
                Ok(vec![SaleEvent::SaleRecorded(SaleRecorded {
                    document: cmd.document.clone(),
                })])
            }
            SaleCommand::VoidSale(cmd) => {
                if self.document.is_none() {
                    return Err(DomainError::not_found());
                }
                if self.status == SaleStatus::Voided {
                    return Err(DomainError::conflict("sale already voided"));
                }
                if cmd.reason.trim().is_empty() {
                    return Err(DomainError::validation("void reason is required"));
                }
                Ok(vec![SaleEvent::SaleVoided(SaleVoided {
                    sale_id: self.id,
                    reason: cmd.reason.trim().to_string(),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}
