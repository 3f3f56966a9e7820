//! Backfill planner: find posting sources that never reached the journal.

use std::collections::HashSet;

use serde::Serialize;

use crate::ledger::{Ledger, Reference};
use crate::posting::{JournalDraft, PostingSource};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedDocument {
    pub reference: Reference,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillPlan {
    pub drafts: Vec<JournalDraft>,
    pub already_posted: Vec<Reference>,
    /// Documents that net to nothing (e.g. fully discounted sales).
    pub empty: Vec<Reference>,
    pub rejected: Vec<RejectedDocument>,
}

impl BackfillPlan {
    pub fn is_noop(&self) -> bool {
        self.drafts.is_empty()
    }
}

/// Plan the entries still missing from `ledger`.
///
/// Repeated documents in `documents` are planned once.
pub fn plan(ledger: &Ledger, documents: &[PostingSource]) -> BackfillPlan {
    let mut out = BackfillPlan::default();
    let mut planned: HashSet<Reference> = HashSet::new();

    for doc in documents {
        let reference = doc.reference();
        if ledger.is_posted(&reference) {
            out.already_posted.push(reference);
            continue;
        }
        if !planned.insert(reference.clone()) {
            continue;
        }

        let Some(draft) = doc.draft() else {
            out.empty.push(reference);
            continue;
        };

        match ledger.check_lines(&draft.lines) {
            Ok(()) => out.drafts.push(draft),
            Err(e) => out.rejected.push(RejectedDocument {
                reference,
                reason: e.to_string(),
            }),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokoledger_core::{Money, TenantId};
    use tokoledger_events::execute;
    use uuid::Uuid;

    use crate::coa::default_chart;
    use crate::ledger::{InitializeChart, LedgerCommand, LedgerId};
    use crate::posting::{ExpensePosting, Fund, SalePosting};

    fn ledger() -> Ledger {
        let mut l = Ledger::empty(LedgerId::for_tenant(TenantId::new()));
        execute(
            &mut l,
            &LedgerCommand::InitializeChart(InitializeChart {
                accounts: default_chart(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        l
    }

    fn sale(amount: i64) -> PostingSource {
        PostingSource::Sale(SalePosting {
            sale_id: Uuid::now_v7(),
            receipt_no: "R-1".into(),
            cash: Money::new(amount),
            non_cash: Money::ZERO,
            receivable: Money::ZERO,
            revenue: Money::new(amount),
            tax: Money::ZERO,
            cost_of_goods: Money::ZERO,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn second_run_plans_nothing() {
        let mut l = ledger();
        let docs = vec![sale(1_000), sale(2_000)];

        let first = plan(&l, &docs);
        assert_eq!(first.drafts.len(), 2);

        for d in first.drafts {
            execute(&mut l, &LedgerCommand::PostJournalEntry(d.into_command(Uuid::now_v7()))).unwrap();
        }

        let second = plan(&l, &docs);
        assert!(second.is_noop());
        assert_eq!(second.already_posted.len(), 2);
    }

    #[test]
    fn sorts_empty_and_rejected_documents() {
        let l = ledger();
        let bad_expense = PostingSource::Expense(ExpensePosting {
            expense_id: Uuid::now_v7(),
            account: Some("7777".into()),
            fund: Fund::Cash,
            amount: Money::new(5_000),
            description: "Mystery".into(),
            occurred_at: Utc::now(),
        });
        let dup = sale(300);

        let p = plan(&l, &[sale(0), bad_expense, dup.clone(), dup]);
        assert_eq!(p.empty.len(), 1);
        assert_eq!(p.rejected.len(), 1);
        assert!(p.rejected[0].reason.contains("7777"));
        assert_eq!(p.drafts.len(), 1);
    }
}
