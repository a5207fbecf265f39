use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use purchasebook_core::{Aggregate, AggregateRoot, DomainError, PurchaseId};

/// An "add stock" request coming from a posted purchase.
///
/// `purchase_id` doubles as the idempotency token: an item never applies the
/// same purchase twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceipt {
    pub purchase_id: PurchaseId,
    pub product: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub supplier: String,
}

/// Aggregate root: InventoryItem, keyed by product name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    product: String,
    stock: Decimal,
    last_unit_price: Option<Decimal>,
    last_supplier: Option<String>,
    received: BTreeSet<PurchaseId>,
    version: u64,
}

impl InventoryItem {
    /// An item with no stock and no history.
    pub fn empty(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            stock: Decimal::ZERO,
            last_unit_price: None,
            last_supplier: None,
            received: BTreeSet::new(),
            version: 0,
        }
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn stock(&self) -> Decimal {
        self.stock
    }

    pub fn last_unit_price(&self) -> Option<Decimal> {
        self.last_unit_price
    }

    pub fn last_supplier(&self) -> Option<&str> {
        self.last_supplier.as_deref()
    }

    pub fn has_received(&self, purchase_id: PurchaseId) -> bool {
        self.received.contains(&purchase_id)
    }
}

impl AggregateRoot for InventoryItem {
    type Id = String;

    fn id(&self) -> &Self::Id {
        &self.product
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ReceiveStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub receipt: StockReceipt,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    ReceiveStock(ReceiveStock),
}

/// Event: StockReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceived {
    pub purchase_id: PurchaseId,
    pub product: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub supplier: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    StockReceived(StockReceived),
}

impl InventoryEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::StockReceived(_) => "inventory.item.stock_received",
        }
    }
}

impl Aggregate for InventoryItem {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::StockReceived(e) => {
                self.stock += e.quantity;
                self.last_unit_price = Some(e.unit_price);
                self.last_supplier = Some(e.supplier.clone());
                self.received.insert(e.purchase_id);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::ReceiveStock(cmd) => self.handle_receive(cmd),
        }
    }
}

impl InventoryItem {
    fn handle_receive(&self, cmd: &ReceiveStock) -> Result<Vec<InventoryEvent>, DomainError> {
        let receipt = &cmd.receipt;

        if receipt.product.trim() != self.product {
            return Err(DomainError::invariant("product mismatch"));
        }
        if receipt.supplier.trim().is_empty() {
            return Err(DomainError::validation("supplier cannot be empty"));
        }
        if receipt.quantity <= Decimal::ZERO {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if receipt.unit_price <= Decimal::ZERO {
            return Err(DomainError::validation("unit_price must be positive"));
        }

        // Already applied: accept without effect.
        if self.has_received(receipt.purchase_id) {
            return Ok(vec![]);
        }

        Ok(vec![InventoryEvent::StockReceived(StockReceived {
            purchase_id: receipt.purchase_id,
            product: self.product.clone(),
            quantity: receipt.quantity,
            unit_price: receipt.unit_price,
            supplier: receipt.supplier.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
