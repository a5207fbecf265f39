//! Inventory adapters.
//!
//! Both adapters deduplicate receipts by purchase id.

pub mod in_memory;
pub mod sqlite;
pub mod r#trait;

pub use in_memory::{InMemoryInventory, StockLevel};
pub use r#trait::{Inventory, InventoryError, StockApplied};
pub use sqlite::SqliteInventory;
