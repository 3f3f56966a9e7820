//! Cart pricing. Pure: no stock, no payment, just arithmetic over prices.

use serde::{Deserialize, Serialize};

use tokoledger_core::{DomainError, Money};
use tokoledger_inventory::{Product, ProductId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_name: String,
    /// Base units per `unit_name`.
    pub factor: i64,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_discount: Money,
    /// Cost of one `unit_name`.
    pub unit_cost: Money,
}

impl CartLine {
    pub fn gross(&self) -> Result<Money, DomainError> {
        self.unit_price.times(self.quantity).ok_or_else(out_of_range)
    }

    pub fn net(&self) -> Result<Money, DomainError> {
        self.gross()?.checked_sub(self.line_discount).ok_or_else(out_of_range)
    }

    pub fn base_quantity(&self) -> Result<i64, DomainError> {
        self.quantity
            .checked_mul(self.factor)
            .ok_or_else(|| DomainError::validation("quantity out of range"))
    }

    pub fn cost(&self) -> Result<Money, DomainError> {
        self.unit_cost.times(self.quantity).ok_or_else(out_of_range)
    }

    fn check_range(&self) -> Result<(), DomainError> {
        self.net()?;
        self.cost()?;
        self.base_quantity()?;
        Ok(())
    }
}

fn out_of_range() -> DomainError {
    DomainError::validation("amount out of range")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OrderDiscount {
    #[default]
    None,
    Amount(Money),
    /// 1% = 100.
    PercentBps(u32),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    pub subtotal: Money,
    pub line_discounts: Money,
    pub order_discount: Money,
    pub taxable: Money,
    pub tax: Money,
    pub total: Money,
    pub cost_of_goods: Money,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    lines: Vec<CartLine>,
    order_discount: OrderDiscount,
    tax_bps: u32,
}

impl Cart {
    pub fn new(tax_bps: u32) -> Self {
        Self {
            lines: Vec::new(),
            order_discount: OrderDiscount::None,
            tax_bps,
        }
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn order_discount(&self) -> OrderDiscount {
        self.order_discount
    }

    pub fn tax_bps(&self) -> u32 {
        self.tax_bps
    }

    /// Add `qty` of `unit_name`; returns the index of the (possibly merged) line.
    pub fn add(&mut self, product: &Product, unit_name: &str, qty: i64) -> Result<usize, DomainError> {
        if qty <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if product.is_archived() {
            return Err(DomainError::invariant(format!(
                "product '{}' is archived",
                product.name()
            )));
        }
        let unit = product.unit(unit_name).ok_or_else(|| {
            DomainError::validation(format!(
                "unknown unit '{unit_name}' for product '{}'",
                product.name()
            ))
        })?;

        let product_id = product.id_typed();
        if let Some(idx) = self
            .lines
            .iter()
            .position(|l| l.product_id == product_id && l.unit_name.eq_ignore_ascii_case(&unit.name))
        {
            let mut merged = self.lines[idx].clone();
            merged.quantity = merged
                .quantity
                .checked_add(qty)
                .ok_or_else(|| DomainError::validation("quantity out of range"))?;
            merged.unit_price = unit.price_for(merged.quantity);
            merged.check_range()?;
            self.lines[idx] = merged;
            return Ok(idx);
        }

        let line = CartLine {
            product_id,
            product_name: product.name().to_string(),
            unit_name: unit.name.clone(),
            factor: unit.factor,
            quantity: qty,
            unit_price: unit.price_for(qty),
            line_discount: Money::ZERO,
            unit_cost: product.cost_price().times(unit.factor).ok_or_else(out_of_range)?,
        };
        line.check_range()?;
        self.lines.push(line);
        Ok(self.lines.len() - 1)
    }

    /// Add a discount to a line; the total line discount cannot exceed its gross.
    pub fn add_line_discount(&mut self, idx: usize, discount: Money) -> Result<(), DomainError> {
        if discount.is_negative() {
            return Err(DomainError::validation("discount cannot be negative"));
        }
        let line = self
            .lines
            .get_mut(idx)
            .ok_or_else(|| DomainError::validation("no such cart line"))?;
        let next = line.line_discount.checked_add(discount).ok_or_else(out_of_range)?;
        if next > line.gross()? {
            return Err(DomainError::validation(format!(
                "discount on '{}' exceeds the line amount",
                line.product_name
            )));
        }
        line.line_discount = next;
        Ok(())
    }

    pub fn set_order_discount(&mut self, discount: OrderDiscount) -> Result<(), DomainError> {
        match discount {
            OrderDiscount::Amount(m) if m.is_negative() => {
                Err(DomainError::validation("discount cannot be negative"))
            }
            OrderDiscount::PercentBps(bps) if bps > 10_000 => {
                Err(DomainError::validation("discount cannot exceed 100%"))
            }
            _ => {
                self.order_discount = discount;
                Ok(())
            }
        }
    }

    /// Replace the cost of every line of `product_id` from a per-base-unit cost.
    pub fn set_base_cost(&mut self, product_id: ProductId, base_cost: Money) -> Result<(), DomainError> {
        for line in self.lines.iter_mut().filter(|l| l.product_id == product_id) {
            let unit_cost = base_cost.times(line.factor).ok_or_else(out_of_range)?;
            unit_cost.times(line.quantity).ok_or_else(out_of_range)?;
            line.unit_cost = unit_cost;
        }
        Ok(())
    }

    /// Every sum is checked; a cart too large for `Money` is a validation error.
    pub fn totals(&self) -> Result<CartTotals, DomainError> {
        let subtotal = sum(self.lines.iter().map(CartLine::gross))?;
        let line_discounts = sum(self.lines.iter().map(|l| Ok(l.line_discount)))?;
        let after_lines = subtotal.checked_sub(line_discounts).ok_or_else(out_of_range)?;

        let order_discount = match self.order_discount {
            OrderDiscount::None => Money::ZERO,
            OrderDiscount::Amount(m) => m,
            OrderDiscount::PercentBps(bps) => after_lines.percent_bps(bps),
        }
        .min(after_lines)
        .non_negative();

        let taxable = after_lines.checked_sub(order_discount).ok_or_else(out_of_range)?;
        let tax = taxable.checked_percent_bps(self.tax_bps).ok_or_else(out_of_range)?;

        Ok(CartTotals {
            subtotal,
            line_discounts,
            order_discount,
            taxable,
            tax,
            total: taxable.checked_add(tax).ok_or_else(out_of_range)?,
            cost_of_goods: sum(self.lines.iter().map(CartLine::cost))?,
        })
    }
}

fn sum<I: Iterator<Item = Result<Money, DomainError>>>(amounts: I) -> Result<Money, DomainError> {
    let amounts = amounts.collect::<Result<Vec<_>, _>>()?;
    Money::checked_sum(amounts).ok_or_else(out_of_range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use tokoledger_core::AggregateId;
    use tokoledger_events::execute;
    use tokoledger_inventory::{ArchiveProduct, CreateProduct, ProductCommand, ProductUnit};

    fn noodles() -> Product {
        let mut p = Product::empty(ProductId::new(AggregateId::new()));
        execute(
            &mut p,
            &ProductCommand::CreateProduct(CreateProduct {
                sku: "IND".into(),
                name: "Indomie".into(),
                units: vec![
                    ProductUnit::new("pcs", 1, Money::new(3_500)).with_tier(10, Money::new(3_200)),
                    ProductUnit::new("dus", 40, Money::new(120_000)),
                ],
                cost_price: Money::new(2_800),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        p
    }

    #[test]
    fn merging_lines_reprices_tiers() {
        let p = noodles();
        let mut cart = Cart::new(0);
        cart.add(&p, "pcs", 6).unwrap();
        assert_eq!(cart.lines()[0].unit_price, Money::new(3_500));

        let idx = cart.add(&p, "PCS", 4).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, 10);
        assert_eq!(cart.lines()[0].unit_price, Money::new(3_200));

        cart.add(&p, "dus", 1).unwrap();
        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.lines()[1].base_quantity().unwrap(), 40);
        assert_eq!(cart.lines()[1].unit_cost, Money::new(112_000));
    }

    #[test]
    fn totals_with_discounts_and_tax() {
        let p = noodles();
        let mut cart = Cart::new(1_100);
        let idx = cart.add(&p, "pcs", 2).unwrap();
        cart.add_line_discount(idx, Money::new(1_000)).unwrap();
        cart.set_order_discount(OrderDiscount::PercentBps(1_000)).unwrap();

        let t = cart.totals().unwrap();
        assert_eq!(t.subtotal, Money::new(7_000));
        assert_eq!(t.line_discounts, Money::new(1_000));
        assert_eq!(t.order_discount, Money::new(600));
        assert_eq!(t.taxable, Money::new(5_400));
        assert_eq!(t.tax, Money::new(594));
        assert_eq!(t.total, Money::new(5_994));
        assert_eq!(t.cost_of_goods, Money::new(5_600));
    }

    #[test]
    fn order_discount_is_capped() {
        let p = noodles();
        let mut cart = Cart::new(1_100);
        cart.add(&p, "pcs", 1).unwrap();
        cart.set_order_discount(OrderDiscount::Amount(Money::new(10_000))).unwrap();
        let t = cart.totals().unwrap();
        assert_eq!(t.order_discount, Money::new(3_500));
        assert_eq!(t.total, Money::ZERO);
    }

    #[test]
    fn rejects_bad_input() {
        let mut p = noodles();
        let mut cart = Cart::new(0);
        assert!(cart.add(&p, "crate", 1).is_err());
        assert!(cart.add(&p, "pcs", 0).is_err());

        let idx = cart.add(&p, "pcs", 1).unwrap();
        assert!(cart.add_line_discount(idx, Money::new(3_501)).is_err());
        assert!(cart.set_order_discount(OrderDiscount::PercentBps(10_001)).is_err());

        execute(&mut p, &ProductCommand::ArchiveProduct(ArchiveProduct { occurred_at: Utc::now() })).unwrap();
        assert!(matches!(cart.add(&p, "pcs", 1), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn oversized_lines_are_refused() {
        let p = noodles();
        let mut cart = Cart::new(1_100);
        let err = cart.add(&p, "pcs", i64::MAX / 1000).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(cart.is_empty());

        cart.add(&p, "pcs", i64::MAX / 4_000).unwrap();
        assert!(cart.add(&p, "pcs", i64::MAX / 4_000).is_err());
        assert_eq!(cart.lines()[0].quantity, i64::MAX / 4_000);
    }

    #[test]
    fn totals_report_overflow_instead_of_wrapping() {
        let p = noodles();
        let mut cart = Cart::new(1_100);
        // Each line fits on its own; their sum does not.
        cart.add(&p, "pcs", i64::MAX / 3_500).unwrap();
        cart.add(&p, "dus", i64::MAX / 120_000 / 2).unwrap();
        assert!(matches!(cart.totals(), Err(DomainError::Validation(_))));
    }

    proptest! {
        #[test]
        fn totals_never_go_negative(
            qty in 1i64..500,
            line_discount in 0i64..100_000,
            order in 0i64..1_000_000,
            bps in 0u32..=10_000,
            tax_bps in 0u32..=2_500,
        ) {
            let p = noodles();
            let mut cart = Cart::new(tax_bps);
            let idx = cart.add(&p, "pcs", qty).unwrap();
            let _ = cart.add_line_discount(idx, Money::new(line_discount));
            cart.set_order_discount(if order % 2 == 0 {
                OrderDiscount::Amount(Money::new(order))
            } else {
                OrderDiscount::PercentBps(bps)
            }).unwrap();

            let t = cart.totals().unwrap();
            prop_assert!(!t.taxable.is_negative());
            prop_assert!(!t.tax.is_negative());
            prop_assert_eq!(t.total, t.taxable + t.tax);
            prop_assert_eq!(t.subtotal - t.line_discounts - t.order_discount, t.taxable);
        }
    }
}
