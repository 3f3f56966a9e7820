//! Trial balance: per-account debit/credit totals folded from ledger events.

use std::collections::BTreeMap;

use serde::Serialize;

use tokoledger_core::Money;

use crate::coa::{Account, AccountKind};
use crate::ledger::{LedgerEvent, Side};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountBalance {
    pub code: String,
    pub name: Option<String>,
    pub kind: Option<AccountKind>,
    pub debits: Money,
    pub credits: Money,
}

impl AccountBalance {
    fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            name: None,
            kind: None,
            debits: Money::ZERO,
            credits: Money::ZERO,
        }
    }

    /// Balance signed by the account's normal side (debit-normal when unknown).
    pub fn balance(&self) -> Money {
        match self.kind {
            Some(kind) if !kind.is_debit_normal() => self.credits - self.debits,
            _ => self.debits - self.credits,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrialBalance {
    accounts: BTreeMap<String, AccountBalance>,
}

impl TrialBalance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a LedgerEvent>) -> Self {
        let mut tb = Self::new();
        for e in events {
            tb.apply(e);
        }
        tb
    }

    pub fn apply(&mut self, event: &LedgerEvent) {
        if let LedgerEvent::AccountOpened(e) = event {
            self.open(&e.account);
            return;
        }
        for line in event.lines() {
            let row = self
                .accounts
                .entry(line.account.clone())
                .or_insert_with(|| AccountBalance::new(&line.account));
            match line.side {
                Side::Debit => row.debits += line.amount,
                Side::Credit => row.credits += line.amount,
            }
        }
    }

    fn open(&mut self, account: &Account) {
        let row = self
            .accounts
            .entry(account.code.clone())
            .or_insert_with(|| AccountBalance::new(&account.code));
        row.name = Some(account.name.clone());
        row.kind = Some(account.kind);
    }

    pub fn balance(&self, code: &str) -> Money {
        self.accounts.get(code).map(AccountBalance::balance).unwrap_or(Money::ZERO)
    }

    pub fn rows(&self) -> impl Iterator<Item = &AccountBalance> {
        self.accounts.values()
    }

    pub fn total_debits(&self) -> Money {
        self.accounts.values().map(|a| a.debits).sum()
    }

    pub fn total_credits(&self) -> Money {
        self.accounts.values().map(|a| a.credits).sum()
    }

    pub fn is_balanced(&self) -> bool {
        self.total_debits() == self.total_credits()
    }

    /// Revenue minus expenses.
    pub fn net_income(&self) -> Money {
        self.accounts
            .values()
            .map(|a| match a.kind {
                Some(AccountKind::Revenue) => a.balance(),
                Some(AccountKind::Expense) => -a.balance(),
                _ => Money::ZERO,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use tokoledger_core::TenantId;
    use tokoledger_events::execute;
    use uuid::Uuid;

    use crate::coa::{codes, default_chart};
    use crate::ledger::{InitializeChart, JournalLine, Ledger, LedgerCommand, LedgerId, PostJournalEntry};

    fn post(ledger: &mut Ledger, log: &mut Vec<LedgerEvent>, lines: Vec<JournalLine>) {
        let events = execute(
            ledger,
            &LedgerCommand::PostJournalEntry(PostJournalEntry {
                entry_id: Uuid::now_v7(),
                reference: None,
                lines,
                description: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        log.extend(events);
    }

    fn setup() -> (Ledger, Vec<LedgerEvent>) {
        let mut ledger = Ledger::empty(LedgerId::for_tenant(TenantId::new()));
        let log = execute(
            &mut ledger,
            &LedgerCommand::InitializeChart(InitializeChart {
                accounts: default_chart(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (ledger, log)
    }

    #[test]
    fn sale_and_cost_give_net_income() {
        let (mut ledger, mut log) = setup();
        post(
            &mut ledger,
            &mut log,
            vec![
                JournalLine::debit(codes::CASH, Money::new(111)),
                JournalLine::credit(codes::SALES_REVENUE, Money::new(100)),
                JournalLine::credit(codes::TAX_PAYABLE, Money::new(11)),
            ],
        );
        post(
            &mut ledger,
            &mut log,
            vec![
                JournalLine::debit(codes::COST_OF_GOODS_SOLD, Money::new(60)),
                JournalLine::credit(codes::INVENTORY, Money::new(60)),
            ],
        );

        let tb = TrialBalance::from_events(&log);
        assert!(tb.is_balanced());
        assert_eq!(tb.balance(codes::CASH), Money::new(111));
        assert_eq!(tb.balance(codes::TAX_PAYABLE), Money::new(11));
        assert_eq!(tb.balance(codes::INVENTORY), Money::new(-60));
        assert_eq!(tb.net_income(), Money::new(40));
        assert_eq!(tb.balance("0000"), Money::ZERO);
    }

    proptest! {
        #[test]
        fn posted_ledgers_stay_balanced(amounts in prop::collection::vec(1i64..1_000_000, 1..20)) {
            let (mut ledger, mut log) = setup();
            for (i, a) in amounts.iter().enumerate() {
                let (dr, cr) = if i % 2 == 0 {
                    (codes::CASH, codes::SALES_REVENUE)
                } else {
                    (codes::OPERATING_EXPENSES, codes::BANK)
                };
                post(&mut ledger, &mut log, vec![
                    JournalLine::debit(dr, Money::new(*a)),
                    JournalLine::credit(cr, Money::new(*a)),
                ]);
            }
            let tb = TrialBalance::from_events(&log);
            prop_assert!(tb.is_balanced());
            prop_assert_eq!(tb.total_debits(), Money::new(amounts.iter().sum()));
        }
    }
}
