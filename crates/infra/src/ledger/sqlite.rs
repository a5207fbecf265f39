//! SQLite-backed purchase ledger.
//!
//! One row per purchase in the `purchases` table. Decimals are stored as TEXT
//! (exact), timestamps as fixed-width RFC 3339 TEXT.
//!
//! ## Atomic transitions
//!
//! Every state transition is a single conditional `UPDATE`/`DELETE` whose
//! `WHERE` clause carries the precondition (`posted = 0`, no intent). SQLite
//! executes each statement atomically, so the affected-row count decides the
//! compare-and-set; when it is zero the row is re-read to report why.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use purchasebook_core::PurchaseId;
use purchasebook_purchasing::{
    PostingClaim, PurchaseDraft, PurchaseFields, PurchaseRecord, Quantity, UnitPrice,
};

use super::r#trait::{LedgerError, PurchaseLedger, ensure_editable};
use crate::db;

const SELECT_COLUMNS: &str = r#"
    SELECT id, purchase_date, supplier, product, quantity, unit_price, notes,
           posted, posting_started_at
    FROM purchases
"#;

/// How many times `begin_posting` re-runs its compare-and-set after losing a
/// race to a transition that left the record claimable again.
const CLAIM_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct SqlitePurchaseLedger {
    pool: SqlitePool,
}

impl SqlitePurchaseLedger {
    /// Wrap a pool and make sure the `purchases` table exists.
    pub async fn new(pool: SqlitePool) -> Result<Self, LedgerError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS purchases (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                purchase_date      TEXT NOT NULL,
                supplier           TEXT NOT NULL,
                product            TEXT NOT NULL,
                quantity           TEXT NOT NULL,
                unit_price         TEXT NOT NULL,
                total              TEXT NOT NULL,
                notes              TEXT NULL,
                posted             INTEGER NOT NULL DEFAULT 0,
                posting_started_at TEXT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| map_sqlx_error("create purchases table", e))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS purchases_by_date ON purchases (purchase_date DESC, id DESC)",
        )
        .execute(&pool)
        .await
        .map_err(|e| map_sqlx_error("create purchases index", e))?;

        Ok(Self { pool })
    }

    async fn fetch(&self, id: PurchaseId) -> Result<Option<PurchaseRecord>, LedgerError> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch purchase", e))?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn fetch_many(
        &self,
        filter: &str,
        operation: &str,
    ) -> Result<Vec<PurchaseRecord>, LedgerError> {
        let sql = format!("{SELECT_COLUMNS} {filter} ORDER BY purchase_date DESC, id DESC");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;

        rows.iter().map(record_from_row).collect()
    }

    /// Explain why a guarded statement touched no row.
    async fn blocked_reason(&self, id: PurchaseId) -> LedgerError {
        match self.get(id).await {
            Ok(record) => match ensure_editable(&record) {
                Err(err) => err,
                // Changed back under our feet; report it as contention.
                Ok(()) => LedgerError::PostingInProgress(id),
            },
            Err(err) => err,
        }
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    LedgerError::Persistence(db::describe_sqlx_error(operation, &err))
}

fn record_from_row(row: &SqliteRow) -> Result<PurchaseRecord, LedgerError> {
    let corrupt = |msg: String| LedgerError::Persistence(format!("corrupt purchase row: {msg}"));
    let text = |column: &str| -> Result<String, LedgerError> {
        row.try_get::<String, _>(column)
            .map_err(|e| map_sqlx_error("decode purchase row", e))
    };

    let id: i64 = row
        .try_get("id")
        .map_err(|e| map_sqlx_error("decode purchase row", e))?;
    let posted: i64 = row
        .try_get("posted")
        .map_err(|e| map_sqlx_error("decode purchase row", e))?;
    let notes: Option<String> = row
        .try_get("notes")
        .map_err(|e| map_sqlx_error("decode purchase row", e))?;
    let started: Option<String> = row
        .try_get("posting_started_at")
        .map_err(|e| map_sqlx_error("decode purchase row", e))?;

    let purchase_date = db::decode_ts("purchase_date", &text("purchase_date")?).map_err(corrupt)?;
    let quantity = db::decode_decimal("quantity", &text("quantity")?).map_err(corrupt)?;
    let unit_price = db::decode_decimal("unit_price", &text("unit_price")?).map_err(corrupt)?;
    let posting_started_at = started
        .map(|raw| db::decode_ts("posting_started_at", &raw))
        .transpose()
        .map_err(corrupt)?;

    let fields = PurchaseFields {
        supplier: text("supplier")?,
        product: text("product")?,
        quantity: Quantity::new(quantity).map_err(|e| corrupt(e.to_string()))?,
        unit_price: UnitPrice::new(unit_price).map_err(|e| corrupt(e.to_string()))?,
        notes,
    };

    Ok(PurchaseRecord::restore(
        PurchaseId::new(id),
        purchase_date,
        fields,
        posted != 0,
        posting_started_at,
    ))
}

#[async_trait::async_trait]
impl PurchaseLedger for SqlitePurchaseLedger {
    #[instrument(skip(self, draft), err)]
    async fn create(&self, draft: PurchaseDraft) -> Result<PurchaseRecord, LedgerError> {
        let fields = draft.validate()?;
        let purchase_date = db::now();
        let total = purchasebook_purchasing::compute_total(fields.quantity, fields.unit_price);

        let result = sqlx::query(
            r#"
            INSERT INTO purchases (
                purchase_date, supplier, product, quantity, unit_price, total, notes, posted
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)
            "#,
        )
        .bind(db::encode_ts(purchase_date))
        .bind(&fields.supplier)
        .bind(&fields.product)
        .bind(db::encode_decimal(fields.quantity.value()))
        .bind(db::encode_decimal(fields.unit_price.value()))
        .bind(db::encode_decimal(total))
        .bind(fields.notes.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert purchase", e))?;

        let id = PurchaseId::new(result.last_insert_rowid());
        tracing::debug!(purchase_id = %id, "purchase created");
        Ok(PurchaseRecord::new(id, purchase_date, fields))
    }

    async fn get(&self, id: PurchaseId) -> Result<PurchaseRecord, LedgerError> {
        self.fetch(id).await?.ok_or(LedgerError::NotFound(id))
    }

    async fn list(&self) -> Result<Vec<PurchaseRecord>, LedgerError> {
        self.fetch_many("", "list purchases").await
    }

    #[instrument(skip(self, id, draft), fields(purchase_id = %id), err)]
    async fn update(
        &self,
        id: PurchaseId,
        draft: PurchaseDraft,
    ) -> Result<PurchaseRecord, LedgerError> {
        let mut record = self.get(id).await?;
        ensure_editable(&record)?;
        let fields = draft.validate()?;
        record
            .apply_edit(fields)
            .map_err(|e| LedgerError::from_domain(Some(id), e))?;

        let result = sqlx::query(
            r#"
            UPDATE purchases
            SET supplier = ?2, product = ?3, quantity = ?4, unit_price = ?5, total = ?6, notes = ?7
            WHERE id = ?1 AND posted = 0 AND posting_started_at IS NULL
            "#,
        )
        .bind(id.get())
        .bind(record.supplier())
        .bind(record.product())
        .bind(db::encode_decimal(record.quantity().value()))
        .bind(db::encode_decimal(record.unit_price().value()))
        .bind(db::encode_decimal(record.total()))
        .bind(record.notes())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update purchase", e))?;

        if result.rows_affected() == 0 {
            return Err(self.blocked_reason(id).await);
        }
        Ok(record)
    }

    #[instrument(skip(self, id), fields(purchase_id = %id), err)]
    async fn delete(&self, id: PurchaseId) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "DELETE FROM purchases WHERE id = ?1 AND posted = 0 AND posting_started_at IS NULL",
        )
        .bind(id.get())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete purchase", e))?;

        if result.rows_affected() == 0 {
            return Err(self.blocked_reason(id).await);
        }
        Ok(())
    }

    #[instrument(skip(self, id), fields(purchase_id = %id), err)]
    async fn begin_posting(&self, id: PurchaseId) -> Result<PostingClaim, LedgerError> {
        for _ in 0..CLAIM_ATTEMPTS {
            let result = sqlx::query(
                r#"
                UPDATE purchases
                SET posting_started_at = ?2
                WHERE id = ?1 AND posted = 0 AND posting_started_at IS NULL
                "#,
            )
            .bind(id.get())
            .bind(db::encode_ts(db::now()))
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("claim purchase", e))?;

            let record = self.get(id).await?;
            if result.rows_affected() == 1 {
                return Ok(PostingClaim::Claimed(record));
            }
            if record.is_posted() {
                return Ok(PostingClaim::AlreadyPosted(record));
            }
            if record.is_posting_in_progress() {
                return Ok(PostingClaim::InProgress(record));
            }
        }

        let record = self.get(id).await?;
        Ok(PostingClaim::InProgress(record))
    }

    #[instrument(skip(self, id), fields(purchase_id = %id), err)]
    async fn release_posting(&self, id: PurchaseId) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "UPDATE purchases SET posting_started_at = NULL WHERE id = ?1 AND posted = 0",
        )
        .bind(id.get())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("release purchase claim", e))?;

        if result.rows_affected() == 0 {
            // Posted records keep no intent; only a missing row is an error.
            self.get(id).await?;
        }
        Ok(())
    }

    #[instrument(skip(self, id), fields(purchase_id = %id), err)]
    async fn mark_posted(&self, id: PurchaseId) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            "UPDATE purchases SET posted = 1, posting_started_at = NULL WHERE id = ?1 AND posted = 0",
        )
        .bind(id.get())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark purchase posted", e))?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        self.get(id).await?;
        Ok(false)
    }

    async fn pending_postings(&self) -> Result<Vec<PurchaseRecord>, LedgerError> {
        self.fetch_many(
            "WHERE posted = 0 AND posting_started_at IS NOT NULL",
            "list pending postings",
        )
        .await
    }
}
