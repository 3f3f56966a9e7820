//! Receipt payload and its ESC/POS rendering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tokoledger_core::Money;

use crate::escpos::{EscPosBuilder, PaperWidth};

pub const MAX_COPIES: u8 = 5;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PrintError {
    #[error("copies must be between 1 and {MAX_COPIES}, got {0}")]
    InvalidCopies(u8),

    #[error("receipt has no items")]
    NoItems,

    #[error("missing field: {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub name: String,
    pub quantity: i64,
    #[serde(default)]
    pub unit: Option<String>,
    pub unit_price: Money,
    #[serde(default)]
    pub discount: Money,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptPayment {
    pub method: String,
    pub amount: Money,
}

fn default_paper_mm() -> u32 {
    80
}

fn default_copies() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub store_name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub header_lines: Vec<String>,
    pub receipt_no: String,
    #[serde(default)]
    pub cashier: Option<String>,
    pub printed_at: DateTime<Utc>,
    pub items: Vec<ReceiptItem>,
    pub subtotal: Money,
    #[serde(default)]
    pub discount: Money,
    #[serde(default)]
    pub tax: Money,
    pub total: Money,
    #[serde(default)]
    pub payments: Vec<ReceiptPayment>,
    #[serde(default)]
    pub change: Money,
    #[serde(default)]
    pub outstanding: Money,
    #[serde(default)]
    pub footer_lines: Vec<String>,
    #[serde(default = "default_paper_mm")]
    pub paper_mm: u32,
    #[serde(default)]
    pub open_drawer: bool,
    #[serde(default = "default_copies")]
    pub copies: u8,
}

impl Receipt {
    pub fn validate(&self) -> Result<(), PrintError> {
        if self.store_name.trim().is_empty() {
            return Err(PrintError::MissingField("store_name"));
        }
        if self.receipt_no.trim().is_empty() {
            return Err(PrintError::MissingField("receipt_no"));
        }
        if self.items.is_empty() {
            return Err(PrintError::NoItems);
        }
        if self.copies == 0 || self.copies > MAX_COPIES {
            return Err(PrintError::InvalidCopies(self.copies));
        }
        Ok(())
    }
}

/// Integer amount formatting, e.g. `Rp12.500`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoneyFormat {
    pub symbol: String,
    pub thousands: char,
}

impl Default for MoneyFormat {
    fn default() -> Self {
        Self {
            symbol: "Rp".to_string(),
            thousands: '.',
        }
    }
}

impl MoneyFormat {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    pub fn format(&self, money: Money) -> String {
        let digits = money.amount().unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(self.thousands);
            }
            grouped.push(ch);
        }
        let sign = if money.is_negative() { "-" } else { "" };
        format!("{sign}{}{grouped}", self.symbol)
    }
}

/// Greedy word wrap; words longer than `width` are split.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(8);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(width);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        if word.is_empty() {
            continue;
        }
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Render a complete print job, all copies included.
pub fn render(receipt: &Receipt, money: &MoneyFormat) -> Result<Vec<u8>, PrintError> {
    receipt.validate()?;

    let paper = PaperWidth::from_mm(receipt.paper_mm);
    let width = paper.chars();
    let mut b = EscPosBuilder::new(paper);
    b.init();

    for copy in 0..receipt.copies {
        b.center().bold(true);
        for line in wrap(&receipt.store_name, width) {
            b.text(&line).lf();
        }
        b.bold(false);
        for line in receipt
            .address
            .iter()
            .chain(receipt.phone.iter())
            .chain(receipt.header_lines.iter())
        {
            for wrapped in wrap(line, width) {
                b.text(&wrapped).lf();
            }
        }

        b.left().separator();
        b.line_pair(
            &receipt.receipt_no,
            &receipt.printed_at.format("%d/%m/%Y %H:%M").to_string(),
        );
        if let Some(cashier) = &receipt.cashier {
            b.text("Cashier: ").text(cashier).lf();
        }
        b.separator();

        for item in &receipt.items {
            for line in wrap(&item.name, width) {
                b.text(&line).lf();
            }
            let qty = match &item.unit {
                Some(unit) => format!("  {} {} x {}", item.quantity, unit, money.format(item.unit_price)),
                None => format!("  {} x {}", item.quantity, money.format(item.unit_price)),
            };
            b.line_pair(&qty, &money.format(item.total));
            if item.discount.is_positive() {
                b.line_pair("  Disc", &money.format(-item.discount));
            }
        }

        b.separator();
        b.line_pair("Subtotal", &money.format(receipt.subtotal));
        if receipt.discount.is_positive() {
            b.line_pair("Discount", &money.format(-receipt.discount));
        }
        if receipt.tax.is_positive() {
            b.line_pair("Tax", &money.format(receipt.tax));
        }
        b.bold(true)
            .line_pair("TOTAL", &money.format(receipt.total))
            .bold(false);

        if !receipt.payments.is_empty() {
            b.separator();
            for payment in &receipt.payments {
                b.line_pair(&payment.method, &money.format(payment.amount));
            }
        }
        if receipt.change.is_positive() {
            b.line_pair("Change", &money.format(receipt.change));
        }
        if receipt.outstanding.is_positive() {
            b.line_pair("Outstanding", &money.format(receipt.outstanding));
        }

        if !receipt.footer_lines.is_empty() {
            b.lf().center();
            for line in &receipt.footer_lines {
                for wrapped in wrap(line, width) {
                    b.text(&wrapped).lf();
                }
            }
            b.left();
        }

        b.feed(3).cut();
        if copy == 0 && receipt.open_drawer {
            b.open_drawer();
        }
    }

    Ok(b.build())
}
