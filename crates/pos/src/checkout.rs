//! Checkout planner: turns a priced cart and tenders into everything the
//! checkout workflow must write (sale, shift takings, stock draws, receivable,
//! journal source). Pure.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tokoledger_accounting::{PostingSource, SalePosting};
use tokoledger_core::{DomainError, Money, OutletId, UserId};
use tokoledger_inventory::ProductId;

use crate::cart::{Cart, CartLine, CartTotals, OrderDiscount};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenderMethod {
    Cash,
    Transfer,
    Qris,
    Card,
}

impl TenderMethod {
    pub fn is_cash(self) -> bool {
        self == TenderMethod::Cash
    }

    pub fn label(self) -> &'static str {
        match self {
            TenderMethod::Cash => "Cash",
            TenderMethod::Transfer => "Transfer",
            TenderMethod::Qris => "QRIS",
            TenderMethod::Card => "Card",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tender {
    pub method: TenderMethod,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub sale_id: Uuid,
    pub receipt_no: String,
    pub outlet_id: OutletId,
    pub shift_id: Uuid,
    pub cashier: UserId,
    pub customer: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub tenders: Vec<Tender>,
    pub occurred_at: DateTime<Utc>,
}

/// The completed sale as recorded on the `Sale` aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleDocument {
    pub sale_id: Uuid,
    pub receipt_no: String,
    pub outlet_id: OutletId,
    pub shift_id: Uuid,
    pub cashier: UserId,
    pub customer: Option<String>,
    pub lines: Vec<CartLine>,
    pub order_discount: OrderDiscount,
    pub totals: CartTotals,
    pub tenders: Vec<Tender>,
    /// Cash kept in the drawer (cash tendered − change).
    pub cash: Money,
    pub non_cash: Money,
    pub change: Money,
    pub paid: Money,
    pub outstanding: Money,
    pub occurred_at: DateTime<Utc>,
}

impl SaleDocument {
    pub fn posting(&self) -> SalePosting {
        SalePosting {
            sale_id: self.sale_id,
            receipt_no: self.receipt_no.clone(),
            cash: self.cash,
            non_cash: self.non_cash,
            receivable: self.outstanding,
            revenue: self.totals.taxable,
            tax: self.totals.tax,
            cost_of_goods: self.totals.cost_of_goods,
            occurred_at: self.occurred_at,
        }
    }

    /// Base quantity per product, summed over every unit sold.
    pub fn stock_draws(&self) -> Result<Vec<StockDraw>, DomainError> {
        let mut by_product: BTreeMap<ProductId, i64> = BTreeMap::new();
        for line in &self.lines {
            let drawn = by_product.entry(line.product_id).or_default();
            *drawn = drawn
                .checked_add(line.base_quantity()?)
                .ok_or_else(|| DomainError::validation("quantity out of range"))?;
        }
        Ok(by_product
            .into_iter()
            .map(|(product_id, base_quantity)| StockDraw {
                product_id,
                base_quantity,
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftTakings {
    pub cash: Money,
    pub non_cash: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDraw {
    pub product_id: ProductId,
    pub base_quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivableDraft {
    pub party: String,
    pub amount: Money,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutPlan {
    pub sale: SaleDocument,
    pub shift: ShiftTakings,
    pub stock_draws: Vec<StockDraw>,
    pub receivable: Option<ReceivableDraft>,
    pub posting: PostingSource,
}

pub fn plan(cart: &Cart, request: CheckoutRequest) -> Result<CheckoutPlan, DomainError> {
    if cart.is_empty() {
        return Err(DomainError::validation("cart is empty"));
    }
    if request.tenders.iter().any(|t| !t.amount.is_positive()) {
        return Err(DomainError::validation("tender amounts must be positive"));
    }

    let totals = cart.totals()?;
    let total = totals.total;

    let non_cash = tender_sum(&request.tenders, false)?;
    if non_cash > total {
        return Err(DomainError::validation("non-cash tenders exceed the total"));
    }

    let cash_tendered = tender_sum(&request.tenders, true)?;
    let due_in_cash = total - non_cash;
    let change = (cash_tendered - due_in_cash).non_negative();
    let cash = cash_tendered - change;
    let paid = non_cash + cash;
    let outstanding = total - paid;

    let customer = request
        .customer
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    let receivable = if outstanding.is_positive() {
        let Some(party) = customer.clone() else {
            return Err(DomainError::validation("insufficient payment"));
        };
        Some(ReceivableDraft {
            party,
            amount: outstanding,
            due_date: request.due_date,
        })
    } else {
        None
    };

    let sale = SaleDocument {
        sale_id: request.sale_id,
        receipt_no: request.receipt_no,
        outlet_id: request.outlet_id,
        shift_id: request.shift_id,
        cashier: request.cashier,
        customer,
        lines: cart.lines().to_vec(),
        order_discount: cart.order_discount(),
        totals,
        tenders: request.tenders,
        cash,
        non_cash,
        change,
        paid,
        outstanding,
        occurred_at: request.occurred_at,
    };

    Ok(CheckoutPlan {
        shift: ShiftTakings { cash, non_cash },
        stock_draws: sale.stock_draws()?,
        receivable,
        posting: PostingSource::Sale(sale.posting()),
        sale,
    })
}

fn tender_sum(tenders: &[Tender], cash: bool) -> Result<Money, DomainError> {
    Money::checked_sum(
        tenders
            .iter()
            .filter(|t| t.method.is_cash() == cash)
            .map(|t| t.amount),
    )
    .ok_or_else(|| DomainError::validation("amount out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokoledger_core::AggregateId;
    use tokoledger_events::execute;
    use tokoledger_inventory::{CreateProduct, Product, ProductCommand, ProductUnit};

    fn product(price: i64, cost: i64) -> Product {
        let mut p = Product::empty(ProductId::new(AggregateId::new()));
        execute(
            &mut p,
            &ProductCommand::CreateProduct(CreateProduct {
                sku: "TEH".into(),
                name: "Teh Botol".into(),
                units: vec![
                    ProductUnit::new("btl", 1, Money::new(price)),
                    ProductUnit::new("krat", 12, Money::new(price * 11)),
                ],
                cost_price: Money::new(cost),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        p
    }

    fn cart_of(total: i64) -> Cart {
        let mut cart = Cart::new(0);
        cart.add(&product(total, total / 2), "btl", 1).unwrap();
        cart
    }

    fn request(tenders: Vec<Tender>, customer: Option<&str>) -> CheckoutRequest {
        CheckoutRequest {
            sale_id: Uuid::now_v7(),
            receipt_no: "R-1".into(),
            outlet_id: OutletId::new(),
            shift_id: Uuid::now_v7(),
            cashier: UserId::new(),
            customer: customer.map(str::to_string),
            due_date: None,
            tenders,
            occurred_at: Utc::now(),
        }
    }

    fn tender(method: TenderMethod, amount: i64) -> Tender {
        Tender {
            method,
            amount: Money::new(amount),
        }
    }

    #[test]
    fn change_comes_from_cash_only() {
        let plan = plan(
            &cart_of(35_000),
            request(
                vec![tender(TenderMethod::Qris, 10_000), tender(TenderMethod::Cash, 50_000)],
                None,
            ),
        )
        .unwrap();
        assert_eq!(plan.sale.change, Money::new(25_000));
        assert_eq!(plan.shift.cash, Money::new(25_000));
        assert_eq!(plan.shift.non_cash, Money::new(10_000));
        assert_eq!(plan.sale.outstanding, Money::ZERO);
        assert!(plan.receivable.is_none());
    }

    #[test]
    fn non_cash_cannot_exceed_total() {
        let err = plan(&cart_of(10_000), request(vec![tender(TenderMethod::Card, 10_001)], None)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn underpayment_needs_a_customer() {
        let err = plan(&cart_of(10_000), request(vec![tender(TenderMethod::Cash, 4_000)], None)).unwrap_err();
        assert_eq!(err, DomainError::validation("insufficient payment"));

        let plan = plan(
            &cart_of(10_000),
            request(vec![tender(TenderMethod::Cash, 4_000)], Some("Bu Sari")),
        )
        .unwrap();
        let receivable = plan.receivable.unwrap();
        assert_eq!(receivable.party, "Bu Sari");
        assert_eq!(receivable.amount, Money::new(6_000));

        let PostingSource::Sale(posting) = plan.posting else {
            panic!("expected sale posting");
        };
        assert_eq!(posting.receivable, Money::new(6_000));
        assert_eq!(posting.cash, Money::new(4_000));
    }

    #[test]
    fn fully_discounted_cart_needs_no_tender() {
        let mut cart = cart_of(5_000);
        cart.set_order_discount(OrderDiscount::PercentBps(10_000)).unwrap();
        let plan = plan(&cart, request(vec![], None)).unwrap();
        assert_eq!(plan.sale.totals.total, Money::ZERO);
        assert_eq!(plan.sale.outstanding, Money::ZERO);
        assert!(plan.receivable.is_none());
    }

    #[test]
    fn tender_sums_are_range_checked() {
        let err = plan(
            &cart_of(10_000),
            request(
                vec![tender(TenderMethod::Cash, i64::MAX), tender(TenderMethod::Cash, 1)],
                None,
            ),
        )
        .unwrap_err();
        assert_eq!(err, DomainError::validation("amount out of range"));
    }

    #[test]
    fn empty_cart_is_rejected() {
        assert!(plan(&Cart::new(0), request(vec![], None)).is_err());
    }

    #[test]
    fn stock_draws_sum_base_units_per_product() {
        let p = product(5_000, 3_000);
        let mut cart = Cart::new(0);
        cart.add(&p, "btl", 3).unwrap();
        cart.add(&p, "krat", 2).unwrap();

        let plan = plan(&cart, request(vec![tender(TenderMethod::Transfer, 125_000)], None)).unwrap();
        assert_eq!(
            plan.stock_draws,
            vec![StockDraw {
                product_id: p.id_typed(),
                base_quantity: 27,
            }]
        );
    }
}
