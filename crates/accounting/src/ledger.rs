use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tokoledger_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId, ValueObject,
};
use tokoledger_events::Event;

use crate::coa::Account;

/// Stream type name used by the event store.
pub const AGGREGATE_TYPE: &str = "accounting.ledger";

/// Namespace for deriving a tenant's ledger id.
const LEDGER_NAMESPACE: Uuid = Uuid::from_u128(0x6c65_6467_6572_4e53_8a1d_2f0e_5c3b_9a71);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Debit,
    Credit,
}

impl Side {
    pub fn flip(self) -> Side {
        match self {
            Side::Debit => Side::Credit,
            Side::Credit => Side::Debit,
        }
    }
}

/// One side of a journal entry (immutable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    pub account: String,
    /// Positive amount in the smallest currency unit.
    pub amount: Money,
    pub side: Side,
}

impl ValueObject for JournalLine {}

impl JournalLine {
    pub fn debit(account: impl Into<String>, amount: Money) -> Self {
        Self {
            account: account.into(),
            amount,
            side: Side::Debit,
        }
    }

    pub fn credit(account: impl Into<String>, amount: Money) -> Self {
        Self {
            account: account.into(),
            amount,
            side: Side::Credit,
        }
    }

    pub fn is_debit(&self) -> bool {
        self.side == Side::Debit
    }

    pub fn mirrored(&self) -> Self {
        Self {
            account: self.account.clone(),
            amount: self.amount,
            side: self.side.flip(),
        }
    }
}

/// Source document an entry was posted for (`sale:<id>`, `expense:<id>`, ...).
///
/// A reference is posted at most once per ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    pub kind: String,
    pub id: String,
}

impl ValueObject for Reference {}

impl Reference {
    pub fn new(kind: impl Into<String>, id: impl ToString) -> Self {
        Self {
            kind: kind.into(),
            id: id.to_string(),
        }
    }
}

impl core::fmt::Display for Reference {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Ledger identifier (aggregate id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(pub AggregateId);

impl LedgerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    /// Each tenant has exactly one ledger; its id is derived from the tenant id.
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        let uuid = Uuid::new_v5(&LEDGER_NAMESPACE, tenant_id.as_uuid().as_bytes());
        Self(AggregateId::from_uuid(uuid))
    }

    pub fn aggregate_id(self) -> AggregateId {
        self.0
    }
}

impl core::fmt::Display for LedgerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// What the ledger remembers about a posted entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedEntry {
    pub entry_id: Uuid,
    pub reference: Option<Reference>,
    pub lines: Vec<JournalLine>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub reversed_by: Option<Uuid>,
}

/// Aggregate root: Ledger (double-entry journal, one per tenant).
///
/// Holds the open accounts, posted entries and posted references. Balances
/// are derived elsewhere by folding `LedgerEvent`s (see `balances`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    id: LedgerId,
    version: u64,
    accounts: BTreeMap<String, Account>,
    entries: HashMap<Uuid, PostedEntry>,
    posted_references: HashSet<Reference>,
}

impl Ledger {
    /// Empty aggregate for rehydration.
    pub fn empty(id: LedgerId) -> Self {
        Self {
            id,
            version: 0,
            accounts: BTreeMap::new(),
            entries: HashMap::new(),
            posted_references: HashSet::new(),
        }
    }

    pub fn account(&self, code: &str) -> Option<&Account> {
        self.accounts.get(code)
    }

    /// Open accounts ordered by code.
    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn has_accounts(&self) -> bool {
        !self.accounts.is_empty()
    }

    pub fn entry(&self, entry_id: Uuid) -> Option<&PostedEntry> {
        self.entries.get(&entry_id)
    }

    pub fn is_posted(&self, reference: &Reference) -> bool {
        self.posted_references.contains(reference)
    }

    /// Check a candidate set of lines against the posting rules.
    pub fn check_lines(&self, lines: &[JournalLine]) -> Result<(), DomainError> {
        if lines.is_empty() {
            return Err(DomainError::validation("journal entry must have lines"));
        }

        let mut debit_total: i128 = 0;
        let mut credit_total: i128 = 0;

        for line in lines {
            if !line.amount.is_positive() {
                return Err(DomainError::validation("amount must be positive"));
            }
            if !self.accounts.contains_key(&line.account) {
                return Err(DomainError::validation(format!(
                    "unknown account code '{}'",
                    line.account
                )));
            }
            match line.side {
                Side::Debit => debit_total += line.amount.amount() as i128,
                Side::Credit => credit_total += line.amount.amount() as i128,
            }
        }

        if debit_total == 0 || credit_total == 0 {
            return Err(DomainError::validation(
                "journal entry needs at least one debit and one credit",
            ));
        }
        if debit_total != credit_total {
            return Err(DomainError::invariant("debits must equal credits"));
        }
        Ok(())
    }
}

impl AggregateRoot for Ledger {
    type Id = LedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeChart {
    pub accounts: Vec<Account>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAccount {
    pub account: Account,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostJournalEntry {
    pub entry_id: Uuid,
    pub reference: Option<Reference>,
    pub lines: Vec<JournalLine>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseJournalEntry {
    pub entry_id: Uuid,
    pub original_entry_id: Uuid,
    pub reference: Option<Reference>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    InitializeChart(InitializeChart),
    OpenAccount(OpenAccount),
    PostJournalEntry(PostJournalEntry),
    ReverseJournalEntry(ReverseJournalEntry),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOpened {
    pub account: Account,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryPosted {
    pub entry_id: Uuid,
    pub reference: Option<Reference>,
    pub lines: Vec<JournalLine>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Carries the mirrored lines, so consumers can treat it like a posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryReversed {
    pub entry_id: Uuid,
    pub original_entry_id: Uuid,
    pub reference: Option<Reference>,
    pub lines: Vec<JournalLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    AccountOpened(AccountOpened),
    JournalEntryPosted(JournalEntryPosted),
    JournalEntryReversed(JournalEntryReversed),
}

impl LedgerEvent {
    /// Lines moved by this event (empty for account openings).
    pub fn lines(&self) -> &[JournalLine] {
        match self {
            LedgerEvent::AccountOpened(_) => &[],
            LedgerEvent::JournalEntryPosted(e) => &e.lines,
            LedgerEvent::JournalEntryReversed(e) => &e.lines,
        }
    }
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::AccountOpened(_) => "accounting.ledger.account_opened",
            LedgerEvent::JournalEntryPosted(_) => "accounting.ledger.journal_entry_posted",
            LedgerEvent::JournalEntryReversed(_) => "accounting.ledger.journal_entry_reversed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::AccountOpened(e) => e.occurred_at,
            LedgerEvent::JournalEntryPosted(e) => e.occurred_at,
            LedgerEvent::JournalEntryReversed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Ledger {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::AccountOpened(e) => {
                self.accounts.insert(e.account.code.clone(), e.account.clone());
            }
            LedgerEvent::JournalEntryPosted(e) => {
                if let Some(r) = &e.reference {
                    self.posted_references.insert(r.clone());
                }
                self.entries.insert(
                    e.entry_id,
                    PostedEntry {
                        entry_id: e.entry_id,
                        reference: e.reference.clone(),
                        lines: e.lines.clone(),
                        description: e.description.clone(),
                        occurred_at: e.occurred_at,
                        reversed_by: None,
                    },
                );
            }
            LedgerEvent::JournalEntryReversed(e) => {
                if let Some(r) = &e.reference {
                    self.posted_references.insert(r.clone());
                }
                if let Some(original) = self.entries.get_mut(&e.original_entry_id) {
                    original.reversed_by = Some(e.entry_id);
                }
                self.entries.insert(
                    e.entry_id,
                    PostedEntry {
                        entry_id: e.entry_id,
                        reference: e.reference.clone(),
                        lines: e.lines.clone(),
                        description: Some(format!("reversal of {}", e.original_entry_id)),
                        occurred_at: e.occurred_at,
                        reversed_by: None,
                    },
                );
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LedgerCommand::InitializeChart(cmd) => self.handle_initialize(cmd),
            LedgerCommand::OpenAccount(cmd) => self.handle_open(cmd),
            LedgerCommand::PostJournalEntry(cmd) => self.handle_post(cmd),
            LedgerCommand::ReverseJournalEntry(cmd) => self.handle_reverse(cmd),
        }
    }
}

impl Ledger {
    fn handle_initialize(&self, cmd: &InitializeChart) -> Result<Vec<LedgerEvent>, DomainError> {
        let mut seen = HashSet::new();
        let events: Vec<LedgerEvent> = cmd
            .accounts
            .iter()
            .filter(|a| !a.code.trim().is_empty())
            .filter(|a| !self.accounts.contains_key(&a.code))
            .filter(|a| seen.insert(a.code.clone()))
            .map(|a| {
                LedgerEvent::AccountOpened(AccountOpened {
                    account: a.clone(),
                    occurred_at: cmd.occurred_at,
                })
            })
            .collect();

        if events.is_empty() {
            return Err(DomainError::conflict("chart of accounts already initialized"));
        }
        Ok(events)
    }

    fn handle_open(&self, cmd: &OpenAccount) -> Result<Vec<LedgerEvent>, DomainError> {
        let code = cmd.account.code.trim();
        if code.is_empty() {
            return Err(DomainError::validation("account code cannot be empty"));
        }
        if cmd.account.name.trim().is_empty() {
            return Err(DomainError::validation("account name cannot be empty"));
        }
        if self.accounts.contains_key(code) {
            return Err(DomainError::conflict(format!("account '{code}' already exists")));
        }

        let mut account = cmd.account.clone();
        account.code = code.to_string();
        Ok(vec![LedgerEvent::AccountOpened(AccountOpened {
            account,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_post(&self, cmd: &PostJournalEntry) -> Result<Vec<LedgerEvent>, DomainError> {
        if let Some(r) = &cmd.reference {
            if self.is_posted(r) {
                return Ok(vec![]);
            }
        }
        if self.entries.contains_key(&cmd.entry_id) {
            return Err(DomainError::conflict(format!(
                "journal entry {} already exists",
                cmd.entry_id
            )));
        }

        self.check_lines(&cmd.lines)?;

        Ok(vec![LedgerEvent::JournalEntryPosted(JournalEntryPosted {
            entry_id: cmd.entry_id,
            reference: cmd.reference.clone(),
            lines: cmd.lines.clone(),
            description: cmd.description.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reverse(&self, cmd: &ReverseJournalEntry) -> Result<Vec<LedgerEvent>, DomainError> {
        if let Some(r) = &cmd.reference {
            if self.is_posted(r) {
                return Ok(vec![]);
            }
        }

        let original = self
            .entries
            .get(&cmd.original_entry_id)
            .ok_or_else(DomainError::not_found)?;

        if original.reversed_by.is_some() {
            return Err(DomainError::conflict(format!(
                "journal entry {} is already reversed",
                cmd.original_entry_id
            )));
        }
        if self.entries.contains_key(&cmd.entry_id) {
            return Err(DomainError::conflict(format!(
                "journal entry {} already exists",
                cmd.entry_id
            )));
        }

        Ok(vec![LedgerEvent::JournalEntryReversed(JournalEntryReversed {
            entry_id: cmd.entry_id,
            original_entry_id: cmd.original_entry_id,
            reference: cmd.reference.clone(),
            lines: original.lines.iter().map(JournalLine::mirrored).collect(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
