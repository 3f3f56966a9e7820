use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tokoledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, ValueObject};
use tokoledger_events::Event;

pub const AGGREGATE_TYPE: &str = "inventory.product";

/// Product identifier (tenant-scoped by the event stream).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Archived,
}

/// Wholesale price that kicks in from `min_qty` units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTier {
    pub min_qty: i64,
    pub price: Money,
}

impl ValueObject for PriceTier {}

/// A sellable unit of a product ("pcs", "pack", "box").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUnit {
    pub name: String,
    /// Base units contained in one of this unit.
    pub factor: i64,
    pub price: Money,
    #[serde(default)]
    pub tiers: Vec<PriceTier>,
}

impl ValueObject for ProductUnit {}

impl ProductUnit {
    pub fn new(name: impl Into<String>, factor: i64, price: Money) -> Self {
        Self {
            name: name.into(),
            factor,
            price,
            tiers: Vec::new(),
        }
    }

    pub fn with_tier(mut self, min_qty: i64, price: Money) -> Self {
        self.tiers.push(PriceTier { min_qty, price });
        self
    }

    /// Unit price for buying `qty` of this unit: the highest tier reached, else the base price.
    pub fn price_for(&self, qty: i64) -> Money {
        self.tiers
            .iter()
            .filter(|t| t.min_qty <= qty)
            .max_by_key(|t| t.min_qty)
            .map(|t| t.price)
            .unwrap_or(self.price)
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("unit name cannot be empty"));
        }
        if self.factor < 1 {
            return Err(DomainError::validation(format!(
                "unit '{}' factor must be at least 1",
                self.name
            )));
        }
        if self.price.is_negative() {
            return Err(DomainError::validation(format!(
                "unit '{}' price cannot be negative",
                self.name
            )));
        }

        let mut last_min = 1;
        for tier in &self.tiers {
            if tier.min_qty < 2 {
                return Err(DomainError::validation("tier min_qty must be at least 2"));
            }
            if tier.min_qty <= last_min {
                return Err(DomainError::validation(format!(
                    "unit '{}' tiers must have strictly increasing min_qty",
                    self.name
                )));
            }
            if tier.price.is_negative() {
                return Err(DomainError::validation("tier price cannot be negative"));
            }
            last_min = tier.min_qty;
        }
        Ok(())
    }
}

/// Validate a full unit set: exactly one base unit, unique names.
pub fn validate_units(units: &[ProductUnit]) -> Result<(), DomainError> {
    if units.is_empty() {
        return Err(DomainError::validation("product needs at least one unit"));
    }

    let mut names = HashSet::new();
    for unit in units {
        unit.validate()?;
        if !names.insert(unit.name.trim().to_lowercase()) {
            return Err(DomainError::validation(format!(
                "duplicate unit name '{}'",
                unit.name
            )));
        }
    }

    match units.iter().filter(|u| u.factor == 1).count() {
        1 => Ok(()),
        0 => Err(DomainError::validation("product needs a base unit (factor 1)")),
        _ => Err(DomainError::validation("product has more than one base unit")),
    }
}

/// Aggregate root: Product (catalog entry with units and prices).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    sku: String,
    name: String,
    units: Vec<ProductUnit>,
    /// Cost per base unit, used when no purchase cost is known yet.
    cost_price: Money,
    status: ProductStatus,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            sku: String::new(),
            name: String::new(),
            units: Vec::new(),
            cost_price: Money::ZERO,
            status: ProductStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units(&self) -> &[ProductUnit] {
        &self.units
    }

    pub fn cost_price(&self) -> Money {
        self.cost_price
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    pub fn is_archived(&self) -> bool {
        self.status == ProductStatus::Archived
    }

    /// Case-insensitive unit lookup.
    pub fn unit(&self, name: &str) -> Option<&ProductUnit> {
        let name = name.trim();
        self.units.iter().find(|u| u.name.eq_ignore_ascii_case(name))
    }

    pub fn base_unit(&self) -> Option<&ProductUnit> {
        self.units.iter().find(|u| u.factor == 1)
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub sku: String,
    pub name: String,
    pub units: Vec<ProductUnit>,
    pub cost_price: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePricing {
    pub units: Vec<ProductUnit>,
    /// Leave the cost untouched when `None`.
    pub cost_price: Option<Money>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveProduct {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdatePricing(UpdatePricing),
    ArchiveProduct(ArchiveProduct),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub units: Vec<ProductUnit>,
    pub cost_price: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingUpdated {
    pub product_id: ProductId,
    pub units: Vec<ProductUnit>,
    pub cost_price: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductArchived {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    PricingUpdated(PricingUpdated),
    ProductArchived(ProductArchived),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "inventory.product.created",
            ProductEvent::PricingUpdated(_) => "inventory.product.pricing_updated",
            ProductEvent::ProductArchived(_) => "inventory.product.archived",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::PricingUpdated(e) => e.occurred_at,
            ProductEvent::ProductArchived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.sku = e.sku.clone();
                self.name = e.name.clone();
                self.units = e.units.clone();
                self.cost_price = e.cost_price;
                self.status = ProductStatus::Active;
                self.created = true;
            }
            ProductEvent::PricingUpdated(e) => {
                self.units = e.units.clone();
                self.cost_price = e.cost_price;
            }
            ProductEvent::ProductArchived(_) => {
                self.status = ProductStatus::Archived;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdatePricing(cmd) => self.handle_pricing(cmd),
            ProductCommand::ArchiveProduct(cmd) => self.handle_archive(cmd),
        }
    }
}

impl Product {
    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.cost_price.is_negative() {
            return Err(DomainError::validation("cost price cannot be negative"));
        }
        validate_units(&cmd.units)?;

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: self.id,
            sku: cmd.sku.trim().to_string(),
            name: cmd.name.trim().to_string(),
            units: cmd.units.clone(),
            cost_price: cmd.cost_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_pricing(&self, cmd: &UpdatePricing) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.is_archived() {
            return Err(DomainError::invariant("product is archived"));
        }
        validate_units(&cmd.units)?;

        let cost_price = cmd.cost_price.unwrap_or(self.cost_price);
        if cost_price.is_negative() {
            return Err(DomainError::validation("cost price cannot be negative"));
        }

        Ok(vec![ProductEvent::PricingUpdated(PricingUpdated {
            product_id: self.id,
            units: cmd.units.clone(),
            cost_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_archive(&self, cmd: &ArchiveProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.is_archived() {
            return Err(DomainError::conflict("product already archived"));
        }
        Ok(vec![ProductEvent::ProductArchived(ProductArchived {
            product_id: self.id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokoledger_events::execute;

    fn units() -> Vec<ProductUnit> {
        vec![
            ProductUnit::new("pcs", 1, Money::new(3_500))
                .with_tier(10, Money::new(3_300))
                .with_tier(50, Money::new(3_000)),
            ProductUnit::new("box", 40, Money::new(130_000)),
        ]
    }

    fn created() -> Product {
        let mut p = Product::empty(ProductId::new(AggregateId::new()));
        execute(
            &mut p,
            &ProductCommand::CreateProduct(CreateProduct {
                sku: "IND-GR".into(),
                name: "Indomie Goreng".into(),
                units: units(),
                cost_price: Money::new(2_800),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        p
    }

    #[test]
    fn tier_prices_pick_highest_reached() {
        let pcs = &units()[0];
        assert_eq!(pcs.price_for(1), Money::new(3_500));
        assert_eq!(pcs.price_for(10), Money::new(3_300));
        assert_eq!(pcs.price_for(49), Money::new(3_300));
        assert_eq!(pcs.price_for(120), Money::new(3_000));
    }

    #[test]
    fn unit_set_rules() {
        assert!(validate_units(&units()).is_ok());

        let no_base = vec![ProductUnit::new("box", 40, Money::new(1))];
        assert!(validate_units(&no_base).is_err());

        let two_base = vec![
            ProductUnit::new("pcs", 1, Money::new(1)),
            ProductUnit::new("each", 1, Money::new(1)),
        ];
        assert!(validate_units(&two_base).is_err());

        let dup_name = vec![
            ProductUnit::new("pcs", 1, Money::new(1)),
            ProductUnit::new("PCS", 12, Money::new(1)),
        ];
        assert!(validate_units(&dup_name).is_err());

        let bad_tier = vec![ProductUnit::new("pcs", 1, Money::new(10)).with_tier(1, Money::new(9))];
        assert!(validate_units(&bad_tier).is_err());

        let unordered = vec![
            ProductUnit::new("pcs", 1, Money::new(10))
                .with_tier(10, Money::new(9))
                .with_tier(5, Money::new(8)),
        ];
        assert!(validate_units(&unordered).is_err());
    }

    #[test]
    fn unit_lookup_ignores_case() {
        let p = created();
        assert_eq!(p.unit("BOX").map(|u| u.factor), Some(40));
        assert_eq!(p.base_unit().map(|u| u.name.as_str()), Some("pcs"));
        assert!(p.unit("crate").is_none());
    }

    #[test]
    fn archived_products_cannot_be_repriced() {
        let mut p = created();
        execute(
            &mut p,
            &ProductCommand::ArchiveProduct(ArchiveProduct {
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let err = p
            .handle(&ProductCommand::UpdatePricing(UpdatePricing {
                units: units(),
                cost_price: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn creating_twice_conflicts() {
        let p = created();
        let err = p
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                sku: "X".into(),
                name: "X".into(),
                units: units(),
                cost_price: Money::ZERO,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }
}
