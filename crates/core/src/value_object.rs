//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity and are compared by their attribute values.
/// Constructors validate once, so a value object that exists is always valid:
///
/// ```ignore
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// struct Quantity(Decimal);
///
/// impl ValueObject for Quantity {}
///
/// assert_eq!(Quantity::new(dec!(10))?, Quantity::new(dec!(10.00))?);
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
