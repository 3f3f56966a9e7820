//! Posting rules: business documents → balanced journal drafts.
//!
//! Every builder is pure. Zero-amount lines are dropped, and a document that
//! leaves no lines produces no draft at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tokoledger_core::Money;

use crate::coa::codes;
use crate::ledger::{JournalLine, PostJournalEntry, Reference};

/// Where money physically moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fund {
    Cash,
    Bank,
}

impl Fund {
    pub fn account_code(self) -> &'static str {
        match self {
            Fund::Cash => codes::CASH,
            Fund::Bank => codes::BANK,
        }
    }
}

/// A balanced entry ready to be posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalDraft {
    pub reference: Reference,
    pub description: String,
    pub lines: Vec<JournalLine>,
    pub occurred_at: DateTime<Utc>,
}

impl JournalDraft {
    pub fn into_command(self, entry_id: Uuid) -> PostJournalEntry {
        PostJournalEntry {
            entry_id,
            reference: Some(self.reference),
            lines: self.lines,
            description: Some(self.description),
            occurred_at: self.occurred_at,
        }
    }
}

/// Completed sale, in ledger terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalePosting {
    pub sale_id: Uuid,
    pub receipt_no: String,
    /// Cash kept in the drawer (tendered cash minus change).
    pub cash: Money,
    pub non_cash: Money,
    pub receivable: Money,
    /// Sales net of every discount, before tax.
    pub revenue: Money,
    pub tax: Money,
    pub cost_of_goods: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPosting {
    pub payment_id: Uuid,
    pub debt_id: Uuid,
    pub fund: Fund,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasePosting {
    pub purchase_id: Uuid,
    pub supplier: String,
    pub paid: Money,
    pub fund: Fund,
    pub unpaid: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpensePosting {
    pub expense_id: Uuid,
    /// Expense account; defaults to Operating Expenses.
    pub account: Option<String>,
    pub fund: Fund,
    pub amount: Money,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftVariancePosting {
    pub shift_id: Uuid,
    /// counted − expected; negative means the drawer is short.
    pub variance: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Anything that should end up in the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PostingSource {
    Sale(SalePosting),
    SaleVoid(SalePosting),
    ReceivablePayment(PaymentPosting),
    Purchase(PurchasePosting),
    PayablePayment(PaymentPosting),
    Expense(ExpensePosting),
    ShiftVariance(ShiftVariancePosting),
}

impl PostingSource {
    pub fn reference(&self) -> Reference {
        match self {
            PostingSource::Sale(s) => Reference::new("sale", s.sale_id),
            PostingSource::SaleVoid(s) => Reference::new("sale_void", s.sale_id),
            PostingSource::ReceivablePayment(p) => Reference::new("receivable_payment", p.payment_id),
            PostingSource::Purchase(p) => Reference::new("purchase", p.purchase_id),
            PostingSource::PayablePayment(p) => Reference::new("payable_payment", p.payment_id),
            PostingSource::Expense(e) => Reference::new("expense", e.expense_id),
            PostingSource::ShiftVariance(v) => Reference::new("shift_variance", v.shift_id),
        }
    }

    pub fn draft(&self) -> Option<JournalDraft> {
        match self {
            PostingSource::Sale(s) => sale(s),
            PostingSource::SaleVoid(s) => sale_void(s),
            PostingSource::ReceivablePayment(p) => receivable_payment(p),
            PostingSource::Purchase(p) => purchase(p),
            PostingSource::PayablePayment(p) => payable_payment(p),
            PostingSource::Expense(e) => expense(e),
            PostingSource::ShiftVariance(v) => shift_variance(v),
        }
    }
}

fn draft(
    reference: Reference,
    description: String,
    lines: Vec<JournalLine>,
    occurred_at: DateTime<Utc>,
) -> Option<JournalDraft> {
    let lines: Vec<JournalLine> = lines.into_iter().filter(|l| !l.amount.is_zero()).collect();
    if lines.is_empty() {
        return None;
    }
    Some(JournalDraft {
        reference,
        description,
        lines,
        occurred_at,
    })
}

fn sale_lines(s: &SalePosting) -> Vec<JournalLine> {
    vec![
        JournalLine::debit(codes::CASH, s.cash),
        JournalLine::debit(codes::BANK, s.non_cash),
        JournalLine::debit(codes::ACCOUNTS_RECEIVABLE, s.receivable),
        JournalLine::credit(codes::SALES_REVENUE, s.revenue),
        JournalLine::credit(codes::TAX_PAYABLE, s.tax),
        JournalLine::debit(codes::COST_OF_GOODS_SOLD, s.cost_of_goods),
        JournalLine::credit(codes::INVENTORY, s.cost_of_goods),
    ]
}

pub fn sale(s: &SalePosting) -> Option<JournalDraft> {
    draft(
        Reference::new("sale", s.sale_id),
        format!("Sale {}", s.receipt_no),
        sale_lines(s),
        s.occurred_at,
    )
}

pub fn sale_void(s: &SalePosting) -> Option<JournalDraft> {
    draft(
        Reference::new("sale_void", s.sale_id),
        format!("Void of sale {}", s.receipt_no),
        sale_lines(s).iter().map(JournalLine::mirrored).collect(),
        s.occurred_at,
    )
}

pub fn receivable_payment(p: &PaymentPosting) -> Option<JournalDraft> {
    draft(
        Reference::new("receivable_payment", p.payment_id),
        format!("Receivable payment on {}", p.debt_id),
        vec![
            JournalLine::debit(p.fund.account_code(), p.amount),
            JournalLine::credit(codes::ACCOUNTS_RECEIVABLE, p.amount),
        ],
        p.occurred_at,
    )
}

pub fn purchase(p: &PurchasePosting) -> Option<JournalDraft> {
    draft(
        Reference::new("purchase", p.purchase_id),
        format!("Purchase from {}", p.supplier),
        vec![
            JournalLine::debit(codes::INVENTORY, p.paid + p.unpaid),
            JournalLine::credit(p.fund.account_code(), p.paid),
            JournalLine::credit(codes::ACCOUNTS_PAYABLE, p.unpaid),
        ],
        p.occurred_at,
    )
}

pub fn payable_payment(p: &PaymentPosting) -> Option<JournalDraft> {
    draft(
        Reference::new("payable_payment", p.payment_id),
        format!("Payable payment on {}", p.debt_id),
        vec![
            JournalLine::debit(codes::ACCOUNTS_PAYABLE, p.amount),
            JournalLine::credit(p.fund.account_code(), p.amount),
        ],
        p.occurred_at,
    )
}

pub fn expense(e: &ExpensePosting) -> Option<JournalDraft> {
    let account = e.account.as_deref().unwrap_or(codes::OPERATING_EXPENSES);
    draft(
        Reference::new("expense", e.expense_id),
        e.description.clone(),
        vec![
            JournalLine::debit(account, e.amount),
            JournalLine::credit(e.fund.account_code(), e.amount),
        ],
        e.occurred_at,
    )
}

pub fn shift_variance(v: &ShiftVariancePosting) -> Option<JournalDraft> {
    let reference = Reference::new("shift_variance", v.shift_id);
    let amount = Money::new(v.variance.amount().abs());
    let lines = if v.variance.is_negative() {
        vec![
            JournalLine::debit(codes::CASH_SHORT_AND_OVER, amount),
            JournalLine::credit(codes::CASH, amount),
        ]
    } else {
        vec![
            JournalLine::debit(codes::CASH, amount),
            JournalLine::credit(codes::CASH_SHORT_AND_OVER, amount),
        ]
    };
    draft(reference, format!("Cash variance for shift {}", v.shift_id), lines, v.occurred_at)
}
