//! Accounting module (double-entry ledger, event-sourced).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod backfill;
pub mod balances;
pub mod coa;
pub mod ledger;
pub mod posting;

pub use backfill::{BackfillPlan, RejectedDocument, plan};
pub use balances::{AccountBalance, TrialBalance};
pub use coa::{Account, AccountKind, codes, default_chart};
pub use ledger::{
    AccountOpened, InitializeChart, JournalEntryPosted, JournalEntryReversed, JournalLine, Ledger,
    LedgerCommand, LedgerEvent, LedgerId, OpenAccount, PostJournalEntry, PostedEntry, Reference,
    ReverseJournalEntry, Side,
};
pub use posting::{
    ExpensePosting, Fund, JournalDraft, PaymentPosting, PostingSource, PurchasePosting,
    SalePosting, ShiftVariancePosting,
};
