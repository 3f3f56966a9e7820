//! Receivables and payables (customer debts and supplier bills).

pub mod aging;
pub mod debt;

pub use aging::{AgingBucket, AgingReport, aging};
pub use debt::{
    CancelDebt, Debt, DebtCancelled, DebtCommand, DebtEvent, DebtId, DebtKind, DebtOpened,
    DebtStatus, OpenDebt, Payment, PaymentRecorded, RecordPayment,
};
