//! Chart of accounts.

use serde::{Deserialize, Serialize};

use tokoledger_core::ValueObject;

/// High-level account kind (determines normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountKind {
    /// Assets and expenses grow on the debit side; everything else on credit.
    pub fn is_debit_normal(self) -> bool {
        matches!(self, AccountKind::Asset | AccountKind::Expense)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub code: String, // e.g. "1000"
    pub name: String, // e.g. "Cash"
    pub kind: AccountKind,
}

impl ValueObject for Account {}

impl Account {
    pub fn new(code: impl Into<String>, name: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            kind,
        }
    }
}

/// Account codes the posting rules rely on.
pub mod codes {
    pub const CASH: &str = "1000";
    pub const BANK: &str = "1010";
    pub const ACCOUNTS_RECEIVABLE: &str = "1100";
    pub const INVENTORY: &str = "1200";
    pub const ACCOUNTS_PAYABLE: &str = "2000";
    pub const TAX_PAYABLE: &str = "2100";
    pub const OWNER_EQUITY: &str = "3000";
    pub const SALES_REVENUE: &str = "4000";
    pub const OTHER_INCOME: &str = "4900";
    pub const COST_OF_GOODS_SOLD: &str = "5000";
    pub const OPERATING_EXPENSES: &str = "6000";
    pub const CASH_SHORT_AND_OVER: &str = "6900";
}

/// The template every new tenant ledger starts from.
pub fn default_chart() -> Vec<Account> {
    use AccountKind::*;

    vec![
        Account::new(codes::CASH, "Cash", Asset),
        Account::new(codes::BANK, "Bank", Asset),
        Account::new(codes::ACCOUNTS_RECEIVABLE, "Accounts Receivable", Asset),
        Account::new(codes::INVENTORY, "Inventory", Asset),
        Account::new(codes::ACCOUNTS_PAYABLE, "Accounts Payable", Liability),
        Account::new(codes::TAX_PAYABLE, "Tax Payable", Liability),
        Account::new(codes::OWNER_EQUITY, "Owner's Equity", Equity),
        Account::new(codes::SALES_REVENUE, "Sales Revenue", Revenue),
        Account::new(codes::OTHER_INCOME, "Other Income", Revenue),
        Account::new(codes::COST_OF_GOODS_SOLD, "Cost of Goods Sold", Expense),
        Account::new(codes::OPERATING_EXPENSES, "Operating Expenses", Expense),
        Account::new(codes::CASH_SHORT_AND_OVER, "Cash Short and Over", Expense),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn default_chart_codes_are_unique() {
        let chart = default_chart();
        let codes: HashSet<_> = chart.iter().map(|a| a.code.as_str()).collect();
        assert_eq!(codes.len(), chart.len());
        assert_eq!(chart.len(), 12);
    }

    #[test]
    fn normal_sides() {
        assert!(AccountKind::Asset.is_debit_normal());
        assert!(AccountKind::Expense.is_debit_normal());
        assert!(!AccountKind::Revenue.is_debit_normal());
        assert!(!AccountKind::Liability.is_debit_normal());
        assert!(!AccountKind::Equity.is_debit_normal());
    }
}
