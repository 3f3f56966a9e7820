use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use tokoledger_accounting::{AccountKind, Fund, JournalLine, Reference};
use tokoledger_core::{DomainError, Money, OutletId};
use tokoledger_infra::workflows::{CheckoutItem, PurchaseLine};
use tokoledger_inventory::ProductUnit;
use tokoledger_pos::{CashDirection, OrderDiscount, SaleDocument, Tender};
use tokoledger_printing::{Receipt, ReceiptItem, ReceiptPayment};
use tokoledger_receivables::DebtKind;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    pub units: Vec<ProductUnit>,
    #[serde(default)]
    pub cost_price: Money,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePricingRequest {
    pub units: Vec<ProductUnit>,
    #[serde(default)]
    pub cost_price: Option<Money>,
}

#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    #[serde(default)]
    pub include_archived: bool,
}

#[derive(Debug, Deserialize)]
pub struct CountStockRequest {
    pub counted: i64,
}

#[derive(Debug, Deserialize)]
pub struct OpenShiftRequest {
    #[serde(default)]
    pub opening_cash: Money,
}

#[derive(Debug, Deserialize)]
pub struct CashMovementRequest {
    pub direction: CashDirection,
    pub amount: Money,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CloseShiftRequest {
    pub counted_cash: Money,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub items: Vec<CheckoutItem>,
    #[serde(default)]
    pub order_discount: OrderDiscount,
    #[serde(default)]
    pub tenders: Vec<Tender>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub receipt_no: Option<String>,
    /// The cashier confirmed selling past zero stock.
    #[serde(default)]
    pub allow_negative_stock: bool,
}

#[derive(Debug, Deserialize)]
pub struct VoidSaleRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct SalesQuery {
    #[serde(default)]
    pub outlet_id: Option<OutletId>,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub supplier: String,
    pub lines: Vec<PurchaseLine>,
    #[serde(default)]
    pub paid: Money,
    #[serde(default = "default_fund")]
    pub fund: Fund,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DebtsQuery {
    #[serde(default)]
    pub kind: Option<DebtKind>,
}

#[derive(Debug, Deserialize)]
pub struct AgingQuery {
    #[serde(default)]
    pub kind: Option<DebtKind>,
    /// Aging date; today when absent.
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub amount: Money,
    #[serde(default = "default_fund")]
    pub fund: Fund,
}

#[derive(Debug, Deserialize)]
pub struct OpenAccountRequest {
    pub code: String,
    pub name: String,
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct PostJournalRequest {
    #[serde(default)]
    pub reference: Option<Reference>,
    pub lines: Vec<JournalLine>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ExpenseRequest {
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default = "default_fund")]
    pub fund: Fund,
    pub amount: Money,
    pub description: String,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

fn default_fund() -> Fund {
    Fund::Cash
}

// -------------------------
// Mapping helpers
// -------------------------

pub fn parse_account_kind(s: &str) -> Result<AccountKind, axum::response::Response> {
    match s.to_lowercase().as_str() {
        "asset" => Ok(AccountKind::Asset),
        "liability" => Ok(AccountKind::Liability),
        "equity" => Ok(AccountKind::Equity),
        "revenue" => Ok(AccountKind::Revenue),
        "expense" => Ok(AccountKind::Expense),
        _ => Err(errors::json_error(
            axum::http::StatusCode::BAD_REQUEST,
            "invalid_account_kind",
            "kind must be one of: asset, liability, equity, revenue, expense",
        )),
    }
}

/// Printable receipt for a recorded sale, ready for the print agent.
pub fn receipt_for_sale(sale: &SaleDocument, store_name: &str) -> Result<Receipt, DomainError> {
    let items = sale
        .lines
        .iter()
        .map(|line| {
            Ok(ReceiptItem {
                name: line.product_name.clone(),
                quantity: line.quantity,
                unit: Some(line.unit_name.clone()),
                unit_price: line.unit_price,
                discount: line.line_discount,
                total: line.net()?,
            })
        })
        .collect::<Result<Vec<_>, DomainError>>()?;

    let payments = sale
        .tenders
        .iter()
        .map(|t| ReceiptPayment {
            method: t.method.label().to_string(),
            amount: t.amount,
        })
        .collect();

    let mut footer_lines = Vec::new();
    if let Some(customer) = &sale.customer {
        footer_lines.push(format!("Customer: {customer}"));
    }
    footer_lines.push("Thank you".to_string());

    Ok(Receipt {
        store_name: store_name.to_string(),
        address: None,
        phone: None,
        header_lines: Vec::new(),
        receipt_no: sale.receipt_no.clone(),
        cashier: Some(sale.cashier.to_string()),
        printed_at: sale.occurred_at,
        items,
        subtotal: sale.totals.subtotal - sale.totals.line_discounts,
        discount: sale.totals.order_discount,
        tax: sale.totals.tax,
        total: sale.totals.total,
        payments,
        change: sale.change,
        outstanding: sale.outstanding,
        footer_lines,
        paper_mm: 80,
        open_drawer: sale.cash.is_positive(),
        copies: 1,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use tokoledger_core::{AggregateId, UserId};
    use tokoledger_inventory::ProductId;
    use tokoledger_pos::{CartLine, CartTotals, TenderMethod};

    use super::*;

    fn sale() -> SaleDocument {
        SaleDocument {
            sale_id: Uuid::now_v7(),
            receipt_no: "TRX-20261016-ABC123".into(),
            outlet_id: OutletId::new(),
            shift_id: Uuid::now_v7(),
            cashier: UserId::new(),
            customer: Some("Bu Ani".into()),
            lines: vec![CartLine {
                product_id: ProductId::new(AggregateId::new()),
                product_name: "Teh botol".into(),
                unit_name: "pcs".into(),
                factor: 1,
                quantity: 3,
                unit_price: Money::new(5_000),
                line_discount: Money::new(1_000),
                unit_cost: Money::new(3_500),
            }],
            order_discount: OrderDiscount::Amount(Money::new(500)),
            totals: CartTotals {
                subtotal: Money::new(15_000),
                line_discounts: Money::new(1_000),
                order_discount: Money::new(500),
                taxable: Money::new(13_500),
                tax: Money::ZERO,
                total: Money::new(13_500),
                cost_of_goods: Money::new(10_500),
            },
            tenders: vec![Tender {
                method: TenderMethod::Cash,
                amount: Money::new(20_000),
            }],
            cash: Money::new(13_500),
            non_cash: Money::ZERO,
            change: Money::new(6_500),
            paid: Money::new(13_500),
            outstanding: Money::ZERO,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn receipt_mirrors_the_sale() {
        let receipt = receipt_for_sale(&sale(), "Warung Sari").unwrap();
        assert!(receipt.validate().is_ok());
        assert_eq!(receipt.items[0].total, Money::new(14_000));
        assert_eq!(receipt.subtotal, Money::new(14_000));
        assert_eq!(receipt.discount, Money::new(500));
        assert_eq!(receipt.total, Money::new(13_500));
        assert_eq!(receipt.payments[0].method, "Cash");
        assert_eq!(receipt.change, Money::new(6_500));
        assert!(receipt.open_drawer);
        assert_eq!(receipt.footer_lines[0], "Customer: Bu Ani");
    }

    #[test]
    fn account_kinds_parse_case_insensitively() {
        assert_eq!(parse_account_kind("Expense").unwrap(), AccountKind::Expense);
        assert!(parse_account_kind("income").is_err());
    }
}
