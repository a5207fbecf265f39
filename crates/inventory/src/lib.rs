//! Inventory domain module (stock per product, fed by posted purchases).
//!
//! This crate contains business rules for inventory items, implemented purely as
//! deterministic domain logic (no IO, no storage).

pub mod item;

pub use item::{
    InventoryCommand, InventoryEvent, InventoryItem, ReceiveStock, StockReceipt, StockReceived,
};
