//! SQLite-backed inventory adapter.
//!
//! `stock_receipts` remembers every applied purchase (primary key = purchase
//! id) and `inventory_items` holds the running stock per product. Both writes
//! happen in one transaction, and the receipt insert comes first: when it hits
//! the primary key the purchase was applied before and nothing else changes.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use purchasebook_core::Aggregate;
use purchasebook_inventory::{
    InventoryCommand, InventoryEvent, InventoryItem, ReceiveStock, StockReceipt,
};

use super::in_memory::{StockLevel, map_domain_error};
use super::r#trait::{Inventory, InventoryError, StockApplied};
use crate::db;

#[derive(Debug, Clone)]
pub struct SqliteInventory {
    pool: SqlitePool,
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> InventoryError {
    InventoryError::Unavailable(db::describe_sqlx_error(operation, &err))
}

impl SqliteInventory {
    /// Wrap a pool and make sure the inventory tables exist.
    pub async fn new(pool: SqlitePool) -> Result<Self, InventoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS inventory_items (
                product         TEXT PRIMARY KEY,
                stock           TEXT NOT NULL,
                last_unit_price TEXT NULL,
                last_supplier   TEXT NULL,
                updated_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| map_sqlx_error("create inventory_items table", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stock_receipts (
                purchase_id INTEGER PRIMARY KEY,
                product     TEXT NOT NULL,
                quantity    TEXT NOT NULL,
                unit_price  TEXT NOT NULL,
                supplier    TEXT NOT NULL,
                received_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| map_sqlx_error("create stock_receipts table", e))?;

        Ok(Self { pool })
    }

    pub async fn stock_level(&self, product: &str) -> Result<Option<StockLevel>, InventoryError> {
        let row = sqlx::query(
            "SELECT product, stock, last_unit_price, last_supplier FROM inventory_items WHERE product = ?1",
        )
        .bind(product.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch stock level", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let decode = |e: sqlx::Error| map_sqlx_error("decode stock level", e);
        let stock: String = row.try_get("stock").map_err(decode)?;
        let last_unit_price: Option<String> = row.try_get("last_unit_price").map_err(decode)?;

        Ok(Some(StockLevel {
            product: row.try_get("product").map_err(decode)?,
            quantity: db::decode_decimal("stock", &stock).map_err(InventoryError::Unavailable)?,
            last_unit_price: last_unit_price
                .map(|raw| db::decode_decimal("last_unit_price", &raw))
                .transpose()
                .map_err(InventoryError::Unavailable)?,
            last_supplier: row.try_get("last_supplier").map_err(decode)?,
        }))
    }
}

#[async_trait::async_trait]
impl Inventory for SqliteInventory {
    #[instrument(
        skip(self, receipt),
        fields(purchase_id = %receipt.purchase_id, product = %receipt.product),
        err
    )]
    async fn add_stock(&self, receipt: &StockReceipt) -> Result<StockApplied, InventoryError> {
        let product = receipt.product.trim();
        if product.is_empty() {
            return Err(InventoryError::Rejected("product cannot be empty".to_string()));
        }

        // Domain validation; duplicates are detected by the receipts table.
        let now = db::now();
        let command = InventoryCommand::ReceiveStock(ReceiveStock {
            receipt: receipt.clone(),
            occurred_at: Utc::now(),
        });
        let events = InventoryItem::empty(product)
            .handle(&command)
            .map_err(map_domain_error)?;
        let Some(InventoryEvent::StockReceived(received)) = events.into_iter().next() else {
            return Ok(StockApplied::Duplicate);
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin stock transaction", e))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO stock_receipts (purchase_id, product, quantity, unit_price, supplier, received_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (purchase_id) DO NOTHING
            "#,
        )
        .bind(received.purchase_id.get())
        .bind(&received.product)
        .bind(db::encode_decimal(received.quantity))
        .bind(db::encode_decimal(received.unit_price))
        .bind(&received.supplier)
        .bind(db::encode_ts(now))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert stock receipt", e))?;

        if inserted.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback duplicate receipt", e))?;
            tracing::info!("receipt already applied; skipping");
            return Ok(StockApplied::Duplicate);
        }

        let current: Option<String> =
            sqlx::query_scalar("SELECT stock FROM inventory_items WHERE product = ?1")
                .bind(&received.product)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("fetch current stock", e))?;
        let current = current
            .map(|raw| db::decode_decimal("stock", &raw))
            .transpose()
            .map_err(InventoryError::Unavailable)?
            .unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO inventory_items (product, stock, last_unit_price, last_supplier, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (product) DO UPDATE SET
                stock = excluded.stock,
                last_unit_price = excluded.last_unit_price,
                last_supplier = excluded.last_supplier,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&received.product)
        .bind(db::encode_decimal(current + received.quantity))
        .bind(db::encode_decimal(received.unit_price))
        .bind(&received.supplier)
        .bind(db::encode_ts(now))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("upsert inventory item", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit stock transaction", e))?;

        Ok(StockApplied::Applied)
    }
}
