//! Inventory domain: the product catalog, per-outlet stock and supplier
//! purchases.
//!
//! Deterministic domain logic only (no IO, no HTTP, no storage).

pub mod product;
pub mod purchase;
pub mod stock;

pub use product::{
    ArchiveProduct, CreateProduct, PriceTier, PricingUpdated, Product, ProductArchived,
    ProductCommand, ProductCreated, ProductEvent, ProductId, ProductStatus, ProductUnit,
    UpdatePricing, validate_units,
};
pub use purchase::{
    Purchase, PurchaseCommand, PurchaseDocument, PurchaseEvent, PurchaseId, PurchaseRecorded,
    ReceivedLine, RecordPurchase,
};
pub use stock::{
    CountStock, MovementKind, OpenStock, RecordMovement, StockCommand, StockEvent, StockItem,
    StockItemId, StockMoved, StockOpened, moving_average,
};
