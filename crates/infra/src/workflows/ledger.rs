//! Journal workflows: the chart, manual entries, expenses and the backfill.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, warn};
use uuid::Uuid;

use tokoledger_accounting::{
    Account, AccountKind, ExpensePosting, Fund, InitializeChart, JournalLine, LedgerCommand, LedgerId, OpenAccount,
    PostJournalEntry, PostingSource, Reference, RejectedDocument, ReverseJournalEntry, default_chart,
    ledger::AGGREGATE_TYPE as LEDGER, plan,
};
use tokoledger_core::{DomainError, Money, TenantId};
use tokoledger_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;

use super::{PostingOutcome, WorkflowError, Workflows, ledger_of};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseInput {
    /// Expense account code; Operating Expenses when absent.
    #[serde(default)]
    pub account: Option<String>,
    pub fund: Fund,
    pub amount: Money,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

/// A hand-written journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualEntry {
    /// Posted at most once when present.
    #[serde(default)]
    pub reference: Option<Reference>,
    pub lines: Vec<JournalLine>,
    #[serde(default)]
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// A planned entry the ledger refused at dispatch time.
pub type BackfillFailure = RejectedDocument;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub posted: usize,
    pub already_posted: usize,
    /// Documents whose lines all netted to zero.
    pub empty: usize,
    /// Failed the ledger's checks while planning.
    pub rejected: Vec<RejectedDocument>,
    pub failed: Vec<BackfillFailure>,
}

impl<S, B> Workflows<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Open every default account the ledger does not have yet; returns how
    /// many were opened.
    pub fn initialize_chart(&self, tenant_id: TenantId, occurred_at: DateTime<Utc>) -> Result<usize, WorkflowError> {
        let initialized = self.execute(
            tenant_id,
            LedgerId::for_tenant(tenant_id).aggregate_id(),
            LEDGER,
            LedgerCommand::InitializeChart(InitializeChart {
                accounts: default_chart(),
                occurred_at,
            }),
            ledger_of,
        );
        match initialized {
            Ok(opened) => Ok(opened.len()),
            Err(WorkflowError::Dispatch(DispatchError::Conflict(_))) => Ok(0),
            Err(e) => Err(e),
        }
    }

    pub fn open_account(
        &self,
        tenant_id: TenantId,
        account: Account,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        let code = account.code.clone();
        self.execute(
            tenant_id,
            LedgerId::for_tenant(tenant_id).aggregate_id(),
            LEDGER,
            LedgerCommand::OpenAccount(OpenAccount { account, occurred_at }),
            ledger_of,
        )?;
        info!(%tenant_id, %code, "account opened");
        Ok(())
    }

    pub fn accounts(&self, tenant_id: TenantId) -> Result<Vec<Account>, WorkflowError> {
        let mut accounts: Vec<Account> = self.ledger(tenant_id)?.accounts().cloned().collect();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(accounts)
    }

    pub fn post_manual(&self, tenant_id: TenantId, entry: ManualEntry) -> Result<PostingOutcome, WorkflowError> {
        let entry_id = Uuid::now_v7();
        let committed = self.execute(
            tenant_id,
            LedgerId::for_tenant(tenant_id).aggregate_id(),
            LEDGER,
            LedgerCommand::PostJournalEntry(PostJournalEntry {
                entry_id,
                reference: entry.reference,
                lines: entry.lines,
                description: entry.description,
                occurred_at: entry.occurred_at,
            }),
            ledger_of,
        )?;
        Ok(if committed.is_empty() {
            PostingOutcome::AlreadyPosted
        } else {
            PostingOutcome::Posted(entry_id)
        })
    }

    /// Post the mirror image of `original_entry_id`.
    pub fn reverse_entry(
        &self,
        tenant_id: TenantId,
        original_entry_id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> Result<PostingOutcome, WorkflowError> {
        if self.ledger(tenant_id)?.entry(original_entry_id).is_none() {
            return Err(WorkflowError::NotFound(format!("journal entry {original_entry_id}")));
        }
        let entry_id = Uuid::now_v7();
        self.execute(
            tenant_id,
            LedgerId::for_tenant(tenant_id).aggregate_id(),
            LEDGER,
            LedgerCommand::ReverseJournalEntry(ReverseJournalEntry {
                entry_id,
                original_entry_id,
                reference: Some(Reference::new("reversal", original_entry_id)),
                occurred_at,
            }),
            ledger_of,
        )?;
        info!(%tenant_id, %original_entry_id, %entry_id, "journal entry reversed");
        Ok(PostingOutcome::Posted(entry_id))
    }

    /// Money spent outside a purchase. Has no other record than its entry, so
    /// a posting failure fails the call.
    pub fn record_expense(&self, tenant_id: TenantId, input: ExpenseInput) -> Result<PostingOutcome, WorkflowError> {
        if !input.amount.is_positive() {
            return Err(DomainError::validation("expense amount must be positive").into());
        }
        let description = input.description.trim();
        if description.is_empty() {
            return Err(DomainError::validation("expense description is required").into());
        }

        let account = input.account.as_deref().map(str::trim).filter(|a| !a.is_empty());
        if let Some(code) = account {
            self.ensure_chart(tenant_id, input.occurred_at)?;
            let ledger = self.ledger(tenant_id)?;
            match ledger.account(code) {
                Some(a) if a.kind == AccountKind::Expense => {}
                Some(_) => {
                    return Err(DomainError::validation(format!("account {code} is not an expense account")).into());
                }
                None => return Err(DomainError::validation(format!("unknown account {code}")).into()),
            }
        }

        let source = PostingSource::Expense(ExpensePosting {
            expense_id: Uuid::now_v7(),
            account: account.map(str::to_string),
            fund: input.fund,
            amount: input.amount,
            description: description.to_string(),
            occurred_at: input.occurred_at,
        });
        self.check_posting(tenant_id, &source)?;
        let outcome = self.post(tenant_id, &source)?;
        info!(%tenant_id, amount = %input.amount, "expense recorded");
        Ok(outcome)
    }

    /// Post every document the read models know of that is missing from the
    /// journal. Safe to run any number of times.
    pub fn backfill(&self, tenant_id: TenantId, occurred_at: DateTime<Utc>) -> Result<BackfillReport, WorkflowError> {
        let sources = self.projections().posting_sources(tenant_id);
        if sources.is_empty() {
            return Ok(BackfillReport::default());
        }
        self.ensure_chart(tenant_id, occurred_at)?;

        let ledger = self.ledger(tenant_id)?;
        let planned = plan(&ledger, &sources);

        let mut report = BackfillReport {
            already_posted: planned.already_posted.len(),
            empty: planned.empty.len(),
            rejected: planned.rejected,
            ..BackfillReport::default()
        };

        let ledger_id = LedgerId::for_tenant(tenant_id).aggregate_id();
        for draft in planned.drafts {
            let reference = draft.reference.clone();
            let posted = self.execute(
                tenant_id,
                ledger_id,
                LEDGER,
                LedgerCommand::PostJournalEntry(draft.into_command(Uuid::now_v7())),
                ledger_of,
            );
            match posted {
                Ok(committed) if committed.is_empty() => report.already_posted += 1,
                Ok(_) => report.posted += 1,
                Err(e) => {
                    warn!(%tenant_id, %reference, "backfill entry not posted: {e}");
                    report.failed.push(RejectedDocument {
                        reference,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            %tenant_id,
            posted = report.posted,
            already_posted = report.already_posted,
            rejected = report.rejected.len(),
            failed = report.failed.len(),
            "journal backfill finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use tokoledger_accounting::codes;
    use tokoledger_core::{AggregateId, OutletId};
    use tokoledger_pos::{CloseShift, RegisterCommand, register::AGGREGATE_TYPE as REGISTER};
    use tokoledger_receivables::{
        DebtCommand, DebtId, DebtKind, OpenDebt, RecordPayment, debt::AGGREGATE_TYPE as DEBT,
    };

    use super::*;
    use crate::workflows::testing::{open_shift, workflows};
    use crate::workflows::{debt_of, register_of};

    fn expense(account: Option<&str>, amount: i64) -> ExpenseInput {
        ExpenseInput {
            account: account.map(str::to_string),
            fund: Fund::Cash,
            amount: Money::new(amount),
            description: "listrik".into(),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn expenses_post_to_an_expense_account() {
        let wf = workflows();
        let tenant = TenantId::new();

        let out = wf.record_expense(tenant, expense(None, 200_000)).unwrap();
        assert!(out.entry_id().is_some());
        let tb = wf.projections().ledger.trial_balance(tenant);
        assert_eq!(tb.balance(codes::OPERATING_EXPENSES), Money::new(200_000));
        assert_eq!(tb.net_income(), Money::new(-200_000));

        assert!(wf.record_expense(tenant, expense(Some(codes::CASH), 1_000)).is_err());
        assert!(wf.record_expense(tenant, expense(Some("6123"), 1_000)).is_err());
        assert!(wf.record_expense(tenant, expense(None, 0)).is_err());
    }

    #[test]
    fn backfill_posts_what_the_workflows_skipped() {
        let wf = workflows();
        let tenant = TenantId::new();
        let outlet = OutletId::new();

        // A shift closed and a debt paid through the aggregates directly,
        // without their journal entries.
        let shift_id = open_shift(&wf, tenant, outlet, 10_000);
        wf.execute(
            tenant,
            outlet.into(),
            REGISTER,
            RegisterCommand::CloseShift(CloseShift {
                shift_id,
                counted_cash: Money::new(10_500),
                note: None,
                occurred_at: Utc::now(),
            }),
            register_of,
        )
        .unwrap();

        let debt_id = DebtId::new(AggregateId::new());
        wf.execute(
            tenant,
            debt_id.0,
            DEBT,
            DebtCommand::OpenDebt(OpenDebt {
                kind: DebtKind::Receivable,
                party: "Bu Tini".into(),
                amount: Money::new(30_000),
                due_date: None,
                source_reference: None,
                note: None,
                occurred_at: Utc::now(),
            }),
            debt_of,
        )
        .unwrap();
        wf.execute(
            tenant,
            debt_id.0,
            DEBT,
            DebtCommand::RecordPayment(RecordPayment {
                payment_id: Uuid::now_v7(),
                amount: Money::new(30_000),
                method: Fund::Bank,
                paid_at: Utc::now(),
            }),
            debt_of,
        )
        .unwrap();

        let report = wf.backfill(tenant, Utc::now()).unwrap();
        assert_eq!(report.posted, 2);
        assert!(report.failed.is_empty() && report.rejected.is_empty());

        let tb = wf.projections().ledger.trial_balance(tenant);
        assert!(tb.is_balanced());
        assert_eq!(tb.balance(codes::CASH), Money::new(500));
        assert_eq!(tb.balance(codes::BANK), Money::new(30_000));

        let again = wf.backfill(tenant, Utc::now()).unwrap();
        assert_eq!(again.posted, 0);
        assert_eq!(again.already_posted, 2);
    }

    #[test]
    fn manual_entries_and_reversals() {
        let wf = workflows();
        let tenant = TenantId::new();
        assert_eq!(wf.initialize_chart(tenant, Utc::now()).unwrap(), default_chart().len());
        assert_eq!(wf.initialize_chart(tenant, Utc::now()).unwrap(), 0);

        let entry = ManualEntry {
            reference: Some(Reference::new("capital", "2026-01")),
            lines: vec![
                JournalLine::debit(codes::CASH, Money::new(5_000_000)),
                JournalLine::credit(codes::OWNER_EQUITY, Money::new(5_000_000)),
            ],
            description: Some("modal awal".into()),
            occurred_at: Utc::now(),
        };
        let posted = wf.post_manual(tenant, entry.clone()).unwrap();
        let entry_id = posted.entry_id().unwrap();
        assert_eq!(wf.post_manual(tenant, entry).unwrap(), PostingOutcome::AlreadyPosted);

        wf.reverse_entry(tenant, entry_id, Utc::now()).unwrap();
        let tb = wf.projections().ledger.trial_balance(tenant);
        assert!(tb.is_balanced());
        assert_eq!(tb.balance(codes::CASH), Money::ZERO);
        assert!(wf.reverse_entry(tenant, entry_id, Utc::now()).is_err());
        assert!(matches!(
            wf.reverse_entry(tenant, Uuid::now_v7(), Utc::now()).unwrap_err(),
            WorkflowError::NotFound(_)
        ));
    }

    #[test]
    fn unbalanced_manual_entries_are_rejected() {
        let wf = workflows();
        let tenant = TenantId::new();
        wf.initialize_chart(tenant, Utc::now()).unwrap();
        let entry = ManualEntry {
            reference: None,
            lines: vec![
                JournalLine::debit(codes::CASH, Money::new(100)),
                JournalLine::credit(codes::OTHER_INCOME, Money::new(90)),
            ],
            description: None,
            occurred_at: Utc::now(),
        };
        let err = wf.post_manual(tenant, entry).unwrap_err();
        assert!(matches!(err, WorkflowError::Dispatch(DispatchError::InvariantViolation(_))));
    }

    #[test]
    fn custom_accounts_join_the_chart() {
        let wf = workflows();
        let tenant = TenantId::new();
        wf.open_account(tenant, Account::new("6100", "Sewa", AccountKind::Expense), Utc::now())
            .unwrap();
        let accounts = wf.accounts(tenant).unwrap();
        assert_eq!(accounts.len(), 1);
        wf.record_expense(tenant, expense(Some("6100"), 3_000_000)).unwrap();
        assert_eq!(
            wf.projections().ledger.trial_balance(tenant).balance("6100"),
            Money::new(3_000_000)
        );
    }

    #[test]
    fn backfill_of_an_empty_tenant_is_a_noop() {
        let wf = workflows();
        let tenant = TenantId::new();
        assert_eq!(wf.backfill(tenant, Utc::now()).unwrap(), BackfillReport::default());
        assert!(!wf.ledger(tenant).unwrap().has_accounts());
    }
}
