//! Quantity and price value objects.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use purchasebook_core::{DomainError, DomainResult, ValueObject};

/// Upper bound for a single purchase quantity (rejects fat-finger input).
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Upper bound for a unit price.
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Purchased quantity: `0 < quantity <= MAX_QUANTITY`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

/// Price per unit: `0 < unit_price <= MAX_UNIT_PRICE`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct UnitPrice(Decimal);

fn ensure_in_range(field: &str, value: Decimal, max: Decimal) -> DomainResult<Decimal> {
    if value <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "{field} must be positive (got {value})"
        )));
    }
    if value > max {
        return Err(DomainError::validation(format!(
            "{field} must not exceed {max} (got {value})"
        )));
    }
    Ok(value)
}

impl Quantity {
    pub fn new(value: Decimal) -> DomainResult<Self> {
        ensure_in_range("quantity", value, MAX_QUANTITY).map(Self)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl UnitPrice {
    pub fn new(value: Decimal) -> DomainResult<Self> {
        ensure_in_range("unit_price", value, MAX_UNIT_PRICE).map(Self)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl ValueObject for Quantity {}
impl ValueObject for UnitPrice {}

impl TryFrom<Decimal> for Quantity {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<Decimal> for UnitPrice {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for Decimal {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl From<UnitPrice> for Decimal {
    fn from(value: UnitPrice) -> Self {
        value.0
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::fmt::Display for UnitPrice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Line total. Pure; call it wherever quantity or price changes.
///
/// Both factors are bounded, so the product always fits a `Decimal`.
pub fn compute_total(quantity: Quantity, unit_price: UnitPrice) -> Decimal {
    quantity.0 * unit_price.0
}
