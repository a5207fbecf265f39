use std::sync::Arc;

use thiserror::Error;

use purchasebook_inventory::StockReceipt;

/// What the inventory did with a receipt.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StockApplied {
    /// Stock was increased.
    Applied,
    /// This purchase was applied before; nothing changed.
    Duplicate,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// The inventory refused the receipt (invalid values, unknown product, ...).
    #[error("inventory rejected the receipt: {0}")]
    Rejected(String),

    /// Storage or transport failure; the receipt may be retried.
    #[error("inventory unavailable: {0}")]
    Unavailable(String),
}

/// The external stock-keeping collaborator.
///
/// Implementations that honor `StockReceipt::purchase_id` as an idempotency
/// token (both bundled adapters do) make re-sending a receipt safe: it comes
/// back as `StockApplied::Duplicate` instead of adding stock twice.
#[async_trait::async_trait]
pub trait Inventory: Send + Sync {
    async fn add_stock(&self, receipt: &StockReceipt) -> Result<StockApplied, InventoryError>;
}

#[async_trait::async_trait]
impl<S> Inventory for Arc<S>
where
    S: Inventory + ?Sized,
{
    async fn add_stock(&self, receipt: &StockReceipt) -> Result<StockApplied, InventoryError> {
        (**self).add_stock(receipt).await
    }
}
