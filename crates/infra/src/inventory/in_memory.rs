use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use rust_decimal::Decimal;

use purchasebook_core::{Aggregate, DomainError};
use purchasebook_inventory::{InventoryCommand, InventoryItem, ReceiveStock, StockReceipt};

use super::r#trait::{Inventory, InventoryError, StockApplied};

/// Current stock for one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevel {
    pub product: String,
    pub quantity: Decimal,
    pub last_unit_price: Option<Decimal>,
    pub last_supplier: Option<String>,
}

impl From<&InventoryItem> for StockLevel {
    fn from(item: &InventoryItem) -> Self {
        Self {
            product: item.product().to_string(),
            quantity: item.stock(),
            last_unit_price: item.last_unit_price(),
            last_supplier: item.last_supplier().map(str::to_string),
        }
    }
}

/// In-memory inventory keyed by product name.
///
/// Intended for tests/dev. Items are created on first receipt.
#[derive(Debug, Default)]
pub struct InMemoryInventory {
    items: RwLock<HashMap<String, InventoryItem>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stock_level(&self, product: &str) -> Option<StockLevel> {
        let items = self.items.read().ok()?;
        items.get(product.trim()).map(StockLevel::from)
    }

    pub fn levels(&self) -> Vec<StockLevel> {
        let items = match self.items.read() {
            Ok(items) => items,
            Err(_) => return vec![],
        };
        let mut levels: Vec<_> = items.values().map(StockLevel::from).collect();
        levels.sort_by(|a, b| a.product.cmp(&b.product));
        levels
    }
}

pub(crate) fn map_domain_error(err: DomainError) -> InventoryError {
    InventoryError::Rejected(err.to_string())
}

#[async_trait::async_trait]
impl Inventory for InMemoryInventory {
    async fn add_stock(&self, receipt: &StockReceipt) -> Result<StockApplied, InventoryError> {
        let product = receipt.product.trim();
        if product.is_empty() {
            return Err(InventoryError::Rejected("product cannot be empty".to_string()));
        }

        let mut items = self
            .items
            .write()
            .map_err(|_| InventoryError::Unavailable("lock poisoned".to_string()))?;

        // Work on a copy so a rejected receipt leaves no trace (no empty item either).
        let mut item = items
            .get(product)
            .cloned()
            .unwrap_or_else(|| InventoryItem::empty(product));

        let command = InventoryCommand::ReceiveStock(ReceiveStock {
            receipt: receipt.clone(),
            occurred_at: Utc::now(),
        });
        let events = item.execute(&command).map_err(map_domain_error)?;
        if events.is_empty() {
            return Ok(StockApplied::Duplicate);
        }

        items.insert(product.to_string(), item);
        Ok(StockApplied::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use purchasebook_core::PurchaseId;

    fn receipt(id: i64) -> StockReceipt {
        StockReceipt {
            purchase_id: PurchaseId::new(id),
            product: "Widget".to_string(),
            quantity: Decimal::new(10, 0),
            unit_price: Decimal::new(250, 2),
            supplier: "ACME".to_string(),
        }
    }

    #[tokio::test]
    async fn receipts_accumulate_per_product() {
        let inventory = InMemoryInventory::new();
        assert_eq!(inventory.add_stock(&receipt(1)).await, Ok(StockApplied::Applied));
        assert_eq!(inventory.add_stock(&receipt(2)).await, Ok(StockApplied::Applied));

        let level = inventory.stock_level("Widget").unwrap();
        assert_eq!(level.quantity, Decimal::new(20, 0));
        assert_eq!(level.last_supplier.as_deref(), Some("ACME"));
    }

    #[tokio::test]
    async fn same_purchase_is_applied_once() {
        let inventory = InMemoryInventory::new();
        inventory.add_stock(&receipt(1)).await.unwrap();
        assert_eq!(inventory.add_stock(&receipt(1)).await, Ok(StockApplied::Duplicate));
        assert_eq!(inventory.stock_level("Widget").unwrap().quantity, Decimal::new(10, 0));
    }

    #[tokio::test]
    async fn rejected_receipt_leaves_no_item() {
        let inventory = InMemoryInventory::new();
        let mut bad = receipt(1);
        bad.quantity = Decimal::ZERO;
        assert!(matches!(
            inventory.add_stock(&bad).await,
            Err(InventoryError::Rejected(_))
        ));
        assert!(inventory.levels().is_empty());
    }
}
