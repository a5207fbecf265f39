//! Purchase → inventory posting (application-level orchestration).
//!
//! ## Flow
//!
//! ```text
//! post(id)
//!   ↓
//! 1. Load the record (NotFound / AlreadyPosted short-circuit)
//!   ↓
//! 2. Claim it: ledger compare-and-set on the posting intent
//!      (only the winner continues; losers get AlreadyPosted / InProgress)
//!   ↓
//! 3. Inventory add_stock(receipt), optionally under a timeout
//!   ↓
//! 4. Ledger mark_posted(id)
//! ```
//!
//! ## Partial failures
//!
//! - Inventory refused or failed: the claim is released and the record stays
//!   unposted; `post` can simply be retried.
//! - Inventory timed out: the outcome is unknown, so the claim is kept and the
//!   record is listed by `pending()`.
//! - Flag update failed after inventory succeeded: the claim is kept as well.
//!
//! Records stranded in the last two cases need reconciliation through
//! `resume(id)`, which re-sends the receipt and marks the record posted. This
//! is only safe against an inventory that deduplicates by purchase id (both
//! bundled adapters do); with any other inventory an operator must check the
//! stock before resuming.

use std::time::Duration;

use thiserror::Error;
use tracing::instrument;

use purchasebook_core::PurchaseId;
use purchasebook_inventory::StockReceipt;
use purchasebook_purchasing::{PostingClaim, PurchaseRecord};

use crate::config::PostingConfig;
use crate::inventory::{Inventory, InventoryError, StockApplied};
use crate::ledger::{LedgerError, PurchaseLedger};

/// Non-error results of `post` / `resume`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    /// This call applied the purchase to inventory and marked it posted.
    Posted(PurchaseRecord),
    /// The record was posted before; nothing was done.
    AlreadyPosted(PurchaseRecord),
    /// Another caller holds the posting claim; nothing was done.
    InProgress(PurchaseRecord),
}

impl PostOutcome {
    pub fn record(&self) -> &PurchaseRecord {
        match self {
            PostOutcome::Posted(r)
            | PostOutcome::AlreadyPosted(r)
            | PostOutcome::InProgress(r) => r,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PostingError {
    #[error("purchase {0} not found")]
    NotFound(PurchaseId),

    /// Reading or claiming the record failed; inventory was not touched.
    #[error(transparent)]
    Ledger(LedgerError),

    /// Inventory refused or failed; the record is unposted and can be retried.
    #[error("inventory update failed for purchase {id}: {source}")]
    InventoryApply {
        id: PurchaseId,
        #[source]
        source: InventoryError,
    },

    /// No answer from inventory in time; the record awaits `resume`.
    #[error(
        "inventory did not answer within {after:?} for purchase {id}; reconciliation required"
    )]
    InventoryTimeout { id: PurchaseId, after: Duration },

    /// Inventory was updated but the posted flag was not set; the record awaits `resume`.
    #[error("inventory updated but purchase {id} could not be marked posted: {source}")]
    FlagUpdate {
        id: PurchaseId,
        #[source]
        source: LedgerError,
    },
}

impl From<LedgerError> for PostingError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::NotFound(id) => PostingError::NotFound(id),
            other => PostingError::Ledger(other),
        }
    }
}

/// Applies purchases to inventory, at most once per purchase.
#[derive(Debug)]
pub struct PostingCoordinator<L, I> {
    ledger: L,
    inventory: I,
    config: PostingConfig,
}

impl<L, I> PostingCoordinator<L, I> {
    pub fn new(ledger: L, inventory: I) -> Self {
        Self::with_config(ledger, inventory, PostingConfig::default())
    }

    pub fn with_config(ledger: L, inventory: I, config: PostingConfig) -> Self {
        Self {
            ledger,
            inventory,
            config,
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn inventory(&self) -> &I {
        &self.inventory
    }
}

fn receipt_for(record: &PurchaseRecord) -> StockReceipt {
    StockReceipt {
        purchase_id: record.id_typed(),
        product: record.product().to_string(),
        quantity: record.quantity().value(),
        unit_price: record.unit_price().value(),
        supplier: record.supplier().to_string(),
    }
}

impl<L, I> PostingCoordinator<L, I>
where
    L: PurchaseLedger,
    I: Inventory,
{
    /// Post a purchase to inventory.
    ///
    /// Calling this again for a posted record returns `AlreadyPosted` without
    /// touching inventory. Concurrent calls for the same id apply at most one
    /// delta: only the caller that wins the ledger claim calls inventory.
    #[instrument(skip(self, id), fields(purchase_id = %id), err)]
    pub async fn post(&self, id: PurchaseId) -> Result<PostOutcome, PostingError> {
        let record = self.ledger.get(id).await?;
        if record.is_posted() {
            tracing::info!("purchase already posted");
            return Ok(PostOutcome::AlreadyPosted(record));
        }

        let record = match self.ledger.begin_posting(id).await? {
            PostingClaim::Claimed(record) => record,
            PostingClaim::AlreadyPosted(record) => {
                tracing::info!("purchase posted concurrently");
                return Ok(PostOutcome::AlreadyPosted(record));
            }
            PostingClaim::InProgress(record) => {
                tracing::info!(
                    started_at = ?record.posting_started_at(),
                    "purchase is being posted by another caller"
                );
                return Ok(PostOutcome::InProgress(record));
            }
        };

        tracing::info!(
            product = %record.product(),
            quantity = %record.quantity(),
            unit_price = %record.unit_price(),
            supplier = %record.supplier(),
            "posting intent recorded; applying to inventory"
        );

        match self.apply_to_inventory(&record).await {
            Ok(_) => {}
            Err(err @ PostingError::InventoryApply { .. }) => {
                if let Err(release_err) = self.ledger.release_posting(id).await {
                    // The intent stays behind; `resume` will pick it up.
                    tracing::error!(error = %release_err, "failed to release posting claim");
                }
                return Err(err);
            }
            Err(err) => return Err(err),
        }

        self.finish(record).await
    }

    /// Finish a stranded posting (timeout or flag-update failure).
    ///
    /// Re-sends the receipt, relying on inventory to deduplicate by purchase id,
    /// then marks the record posted. A record without a pending intent is
    /// posted normally.
    #[instrument(skip(self, id), fields(purchase_id = %id), err)]
    pub async fn resume(&self, id: PurchaseId) -> Result<PostOutcome, PostingError> {
        let record = self.ledger.get(id).await?;
        if record.is_posted() {
            return Ok(PostOutcome::AlreadyPosted(record));
        }
        if !record.is_posting_in_progress() {
            return self.post(id).await;
        }

        tracing::warn!(
            started_at = ?record.posting_started_at(),
            "resuming stranded posting"
        );
        self.apply_to_inventory(&record).await?;
        self.finish(record).await
    }

    /// Records whose posting started but never finished.
    pub async fn pending(&self) -> Result<Vec<PurchaseRecord>, PostingError> {
        Ok(self.ledger.pending_postings().await?)
    }

    async fn apply_to_inventory(
        &self,
        record: &PurchaseRecord,
    ) -> Result<StockApplied, PostingError> {
        let id = record.id_typed();
        let receipt = receipt_for(record);

        let result = match self.config.inventory_timeout {
            Some(after) => {
                match tokio::time::timeout(after, self.inventory.add_stock(&receipt)).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::error!(
                            timeout = ?after,
                            "inventory call timed out; posting intent kept for reconciliation"
                        );
                        return Err(PostingError::InventoryTimeout { id, after });
                    }
                }
            }
            None => self.inventory.add_stock(&receipt).await,
        };

        match result {
            Ok(applied) => {
                if applied == StockApplied::Duplicate {
                    tracing::warn!("inventory had already applied this purchase");
                }
                Ok(applied)
            }
            Err(source) => {
                tracing::warn!(error = %source, "inventory update failed; purchase left unposted");
                Err(PostingError::InventoryApply { id, source })
            }
        }
    }

    async fn finish(&self, record: PurchaseRecord) -> Result<PostOutcome, PostingError> {
        let id = record.id_typed();
        let flipped = match self.ledger.mark_posted(id).await {
            Ok(flipped) => flipped,
            Err(source) => {
                tracing::error!(
                    error = %source,
                    "inventory updated but posted flag not set; reconciliation required"
                );
                return Err(PostingError::FlagUpdate { id, source });
            }
        };

        let posted = match self.ledger.get(id).await {
            Ok(posted) => posted,
            Err(err) => {
                // The transition is durable; only the re-read failed.
                tracing::warn!(error = %err, "could not reload posted purchase");
                let mut local = record;
                local.mark_posted();
                local
            }
        };

        if !flipped {
            // Another caller set the flag between our claim and now.
            tracing::warn!("posted flag was already set");
            return Ok(PostOutcome::AlreadyPosted(posted));
        }

        tracing::info!("purchase posted");
        Ok(PostOutcome::Posted(posted))
    }
}
