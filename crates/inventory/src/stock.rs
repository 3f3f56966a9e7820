use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tokoledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, OutletId};
use tokoledger_events::Event;

use crate::product::ProductId;

pub const AGGREGATE_TYPE: &str = "inventory.stock_item";

/// Stock of one product at one outlet.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockItemId(pub AggregateId);

impl StockItemId {
    /// Deterministic: UUIDv5 of the outlet id, namespaced by the product id.
    pub fn for_outlet(product_id: ProductId, outlet_id: OutletId) -> Self {
        let uuid = Uuid::new_v5(product_id.0.as_uuid(), outlet_id.as_uuid().as_bytes());
        Self(AggregateId::from_uuid(uuid))
    }

    pub fn aggregate_id(self) -> AggregateId {
        self.0
    }
}

impl core::fmt::Display for StockItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Sale,
    Purchase,
    Return,
    Adjustment,
    TransferIn,
    TransferOut,
}

impl MovementKind {
    fn check_sign(self, quantity: i64) -> Result<(), DomainError> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity cannot be zero"));
        }
        let ok = match self {
            MovementKind::Sale | MovementKind::TransferOut => quantity < 0,
            MovementKind::Purchase | MovementKind::Return | MovementKind::TransferIn => quantity > 0,
            MovementKind::Adjustment => true,
        };
        if ok {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "quantity {quantity} has the wrong sign for a {self:?} movement"
            )))
        }
    }
}

/// Aggregate root: StockItem (product × outlet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockItem {
    id: StockItemId,
    product_id: Option<ProductId>,
    outlet_id: Option<OutletId>,
    on_hand: i64,
    average_cost: Money,
    version: u64,
    created: bool,
}

impl StockItem {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: StockItemId) -> Self {
        Self {
            id,
            product_id: None,
            outlet_id: None,
            on_hand: 0,
            average_cost: Money::ZERO,
            version: 0,
            created: false,
        }
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn outlet_id(&self) -> Option<OutletId> {
        self.outlet_id
    }

    /// On-hand quantity in base units.
    pub fn on_hand(&self) -> i64 {
        self.on_hand
    }

    /// Moving average cost per base unit.
    pub fn average_cost(&self) -> Money {
        self.average_cost
    }
}

/// `(on_hand⁺·avg + qty·unit_cost) / (on_hand⁺ + qty)`, rounded half-up.
pub fn moving_average(on_hand: i64, average: Money, qty: i64, unit_cost: Money) -> Money {
    let held = on_hand.max(0) as i128;
    let qty = qty as i128;
    let denominator = held + qty;
    if denominator <= 0 {
        return average;
    }
    let numerator = held * average.amount() as i128 + qty * unit_cost.amount() as i128;
    Money::new(((numerator * 2 + denominator) / (denominator * 2)) as i64)
}

impl AggregateRoot for StockItem {
    type Id = StockItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenStock {
    pub product_id: ProductId,
    pub outlet_id: OutletId,
    /// Seed cost for the moving average (the product's catalog cost).
    pub initial_cost: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub kind: MovementKind,
    /// Signed, base units.
    pub quantity: i64,
    pub unit_cost: Option<Money>,
    pub reference: String,
    /// Operator confirmed selling into negative stock.
    #[serde(default)]
    pub allow_negative: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Stock opname: set on-hand to what was physically counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountStock {
    pub counted: i64,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockCommand {
    OpenStock(OpenStock),
    RecordMovement(RecordMovement),
    CountStock(CountStock),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockOpened {
    pub product_id: ProductId,
    pub outlet_id: OutletId,
    pub initial_cost: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMoved {
    pub product_id: ProductId,
    pub outlet_id: OutletId,
    pub kind: MovementKind,
    pub quantity: i64,
    pub unit_cost: Option<Money>,
    pub reference: String,
    pub on_hand_after: i64,
    pub average_cost_after: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    StockOpened(StockOpened),
    StockMoved(StockMoved),
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::StockOpened(_) => "inventory.stock.opened",
            StockEvent::StockMoved(_) => "inventory.stock.moved",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::StockOpened(e) => e.occurred_at,
            StockEvent::StockMoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockItem {
    type Command = StockCommand;
    type Event = StockEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockEvent::StockOpened(e) => {
                self.product_id = Some(e.product_id);
                self.outlet_id = Some(e.outlet_id);
                self.on_hand = 0;
                self.average_cost = e.initial_cost;
                self.created = true;
            }
            StockEvent::StockMoved(e) => {
                self.on_hand = e.on_hand_after;
                self.average_cost = e.average_cost_after;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockCommand::OpenStock(cmd) => self.handle_open(cmd),
            StockCommand::RecordMovement(cmd) => self.handle_movement(cmd),
            StockCommand::CountStock(cmd) => self.handle_count(cmd),
        }
    }
}

impl StockItem {
    fn handle_open(&self, cmd: &OpenStock) -> Result<Vec<StockEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("stock item already exists"));
        }
        if StockItemId::for_outlet(cmd.product_id, cmd.outlet_id) != self.id {
            return Err(DomainError::invariant("stock item id does not match product and outlet"));
        }
        if cmd.initial_cost.is_negative() {
            return Err(DomainError::validation("cost cannot be negative"));
        }
        Ok(vec![StockEvent::StockOpened(StockOpened {
            product_id: cmd.product_id,
            outlet_id: cmd.outlet_id,
            initial_cost: cmd.initial_cost,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_movement(&self, cmd: &RecordMovement) -> Result<Vec<StockEvent>, DomainError> {
        let (product_id, outlet_id) = self.opened()?;
        cmd.kind.check_sign(cmd.quantity)?;

        if let Some(cost) = cmd.unit_cost {
            if cost.is_negative() {
                return Err(DomainError::validation("unit cost cannot be negative"));
            }
        }
        if cmd.kind == MovementKind::Purchase && cmd.unit_cost.is_none() {
            return Err(DomainError::validation("purchase requires a unit cost"));
        }

        let on_hand_after = self
            .on_hand
            .checked_add(cmd.quantity)
            .ok_or_else(|| DomainError::validation("quantity out of range"))?;
        if on_hand_after < 0 && cmd.quantity < 0 && !cmd.allow_negative {
            return Err(DomainError::invariant("insufficient stock"));
        }

        let average_cost_after = match (cmd.kind, cmd.unit_cost) {
            (MovementKind::Purchase, Some(cost)) => {
                moving_average(self.on_hand, self.average_cost, cmd.quantity, cost)
            }
            _ => self.average_cost,
        };

        Ok(vec![StockEvent::StockMoved(StockMoved {
            product_id,
            outlet_id,
            kind: cmd.kind,
            quantity: cmd.quantity,
            unit_cost: cmd.unit_cost,
            reference: cmd.reference.clone(),
            on_hand_after,
            average_cost_after,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_count(&self, cmd: &CountStock) -> Result<Vec<StockEvent>, DomainError> {
        let (product_id, outlet_id) = self.opened()?;
        if cmd.counted < 0 {
            return Err(DomainError::validation("counted quantity cannot be negative"));
        }

        let difference = cmd
            .counted
            .checked_sub(self.on_hand)
            .ok_or_else(|| DomainError::validation("quantity out of range"))?;
        if difference == 0 {
            return Ok(vec![]);
        }

        Ok(vec![StockEvent::StockMoved(StockMoved {
            product_id,
            outlet_id,
            kind: MovementKind::Adjustment,
            quantity: difference,
            unit_cost: None,
            reference: cmd.reference.clone(),
            on_hand_after: cmd.counted,
            average_cost_after: self.average_cost,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn opened(&self) -> Result<(ProductId, OutletId), DomainError> {
        match (self.created, self.product_id, self.outlet_id) {
            (true, Some(p), Some(o)) => Ok((p, o)),
            _ => Err(DomainError::not_found()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokoledger_events::execute;

    fn opened(initial_cost: i64) -> StockItem {
        let product_id = ProductId::new(AggregateId::new());
        let outlet_id = OutletId::new();
        let mut item = StockItem::empty(StockItemId::for_outlet(product_id, outlet_id));
        execute(
            &mut item,
            &StockCommand::OpenStock(OpenStock {
                product_id,
                outlet_id,
                initial_cost: Money::new(initial_cost),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        item
    }

    fn movement(kind: MovementKind, quantity: i64, unit_cost: Option<i64>) -> StockCommand {
        StockCommand::RecordMovement(RecordMovement {
            kind,
            quantity,
            unit_cost: unit_cost.map(Money::new),
            reference: "test".into(),
            allow_negative: false,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn id_is_deterministic_per_product_and_outlet() {
        let product = ProductId::new(AggregateId::new());
        let outlet = OutletId::new();
        assert_eq!(StockItemId::for_outlet(product, outlet), StockItemId::for_outlet(product, outlet));
        assert_ne!(
            StockItemId::for_outlet(product, outlet),
            StockItemId::for_outlet(product, OutletId::new())
        );
    }

    #[test]
    fn sign_must_match_kind() {
        let item = opened(0);
        assert!(matches!(
            item.handle(&movement(MovementKind::Sale, 3, None)),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            item.handle(&movement(MovementKind::Return, -1, None)),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            item.handle(&movement(MovementKind::Adjustment, 0, None)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn overselling_needs_confirmation() {
        let mut item = opened(0);
        execute(&mut item, &movement(MovementKind::Purchase, 2, Some(1_000))).unwrap();

        let err = item.handle(&movement(MovementKind::Sale, -3, None)).unwrap_err();
        assert_eq!(err, DomainError::invariant("insufficient stock"));

        let confirmed = StockCommand::RecordMovement(RecordMovement {
            kind: MovementKind::Sale,
            quantity: -3,
            unit_cost: None,
            reference: "S-1".into(),
            allow_negative: true,
            occurred_at: Utc::now(),
        });
        execute(&mut item, &confirmed).unwrap();
        assert_eq!(item.on_hand(), -1);
    }

    #[test]
    fn purchases_move_the_average_cost() {
        let mut item = opened(0);
        execute(&mut item, &movement(MovementKind::Purchase, 10, Some(1_000))).unwrap();
        assert_eq!(item.average_cost(), Money::new(1_000));

        execute(&mut item, &movement(MovementKind::Purchase, 10, Some(2_000))).unwrap();
        assert_eq!(item.average_cost(), Money::new(1_500));

        execute(&mut item, &movement(MovementKind::Sale, -5, None)).unwrap();
        assert_eq!(item.average_cost(), Money::new(1_500));
        assert_eq!(item.on_hand(), 15);
    }

    #[test]
    fn negative_stock_does_not_weigh_on_the_average() {
        assert_eq!(moving_average(-4, Money::new(900), 10, Money::new(1_200)), Money::new(1_200));
    }

    #[test]
    fn count_emits_adjustment_for_the_difference() {
        let mut item = opened(500);
        execute(&mut item, &movement(MovementKind::Purchase, 10, Some(500))).unwrap();

        let events = execute(
            &mut item,
            &StockCommand::CountStock(CountStock {
                counted: 7,
                reference: "opname-1".into(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        let StockEvent::StockMoved(moved) = &events[0] else {
            panic!("expected movement");
        };
        assert_eq!(moved.kind, MovementKind::Adjustment);
        assert_eq!(moved.quantity, -3);
        assert_eq!(item.on_hand(), 7);

        let none = item
            .handle(&StockCommand::CountStock(CountStock {
                counted: 7,
                reference: "opname-2".into(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn count_against_deep_negative_stock_is_out_of_range() {
        let mut item = opened(0);
        let oversold = StockCommand::RecordMovement(RecordMovement {
            kind: MovementKind::Sale,
            quantity: -i64::MAX,
            unit_cost: None,
            reference: "oversold".into(),
            allow_negative: true,
            occurred_at: Utc::now(),
        });
        execute(&mut item, &oversold).unwrap();

        let err = item
            .handle(&StockCommand::CountStock(CountStock {
                counted: 5,
                reference: "opname".into(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::validation("quantity out of range"));
        assert_eq!(item.on_hand(), -i64::MAX);
    }

    #[test]
    fn movement_before_open_is_not_found() {
        let item = StockItem::empty(StockItemId(AggregateId::new()));
        assert_eq!(
            item.handle(&movement(MovementKind::Purchase, 1, Some(1))),
            Err(DomainError::NotFound)
        );
    }

    proptest! {
        #[test]
        fn average_stays_between_old_and_new_cost(
            on_hand in 0i64..10_000,
            avg in 0i64..1_000_000,
            qty in 1i64..10_000,
            cost in 0i64..1_000_000,
        ) {
            let next = moving_average(on_hand, Money::new(avg), qty, Money::new(cost)).amount();
            prop_assert!(next >= avg.min(cost));
            prop_assert!(next <= avg.max(cost));
        }
    }
}
