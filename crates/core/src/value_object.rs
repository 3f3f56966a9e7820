//! Value object trait: equality by value, not identity.
//!
//! Value objects are domain objects that have **no identity**: they are defined
//! entirely by their attribute values. `Money`, `Reference` and `ProductUnit`
//! are value objects; `Ledger` or `StockItem` are not.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by value. To "modify" one, build
/// a new one.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct PriceTier {
///     min_qty: i64,
///     price: Money,
/// }
///
/// impl ValueObject for PriceTier {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
