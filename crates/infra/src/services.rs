//! Application wiring: one object the outer surface (CLI, UI, HTTP) talks to.

use std::sync::Arc;

use anyhow::Context;

use purchasebook_core::PurchaseId;
use purchasebook_purchasing::{PurchaseDraft, PurchaseRecord};

use crate::config::Settings;
use crate::db;
use crate::inventory::{InMemoryInventory, Inventory, SqliteInventory};
use crate::ledger::{InMemoryPurchaseLedger, LedgerError, PurchaseLedger, SqlitePurchaseLedger};
use crate::posting::{PostOutcome, PostingCoordinator, PostingError};

pub type DynLedger = Arc<dyn PurchaseLedger>;
pub type DynInventory = Arc<dyn Inventory>;

/// Purchase ledger operations plus posting, over type-erased backends.
pub struct PurchaseBook {
    coordinator: PostingCoordinator<DynLedger, DynInventory>,
}

impl PurchaseBook {
    pub fn new(coordinator: PostingCoordinator<DynLedger, DynInventory>) -> Self {
        Self { coordinator }
    }

    pub fn ledger(&self) -> &DynLedger {
        self.coordinator.ledger()
    }

    pub fn inventory(&self) -> &DynInventory {
        self.coordinator.inventory()
    }

    pub async fn list(&self) -> Result<Vec<PurchaseRecord>, LedgerError> {
        self.ledger().list().await
    }

    pub async fn get(&self, id: PurchaseId) -> Result<PurchaseRecord, LedgerError> {
        self.ledger().get(id).await
    }

    pub async fn create(&self, draft: PurchaseDraft) -> Result<PurchaseRecord, LedgerError> {
        let record = self.ledger().create(draft).await?;
        tracing::info!(
            purchase_id = %record.id_typed(),
            total = %record.total(),
            "purchase recorded"
        );
        Ok(record)
    }

    pub async fn update(
        &self,
        id: PurchaseId,
        draft: PurchaseDraft,
    ) -> Result<PurchaseRecord, LedgerError> {
        self.ledger().update(id, draft).await
    }

    pub async fn delete(&self, id: PurchaseId) -> Result<(), LedgerError> {
        self.ledger().delete(id).await?;
        tracing::info!(purchase_id = %id, "purchase deleted");
        Ok(())
    }

    pub async fn post(&self, id: PurchaseId) -> Result<PostOutcome, PostingError> {
        self.coordinator.post(id).await
    }

    pub async fn resume(&self, id: PurchaseId) -> Result<PostOutcome, PostingError> {
        self.coordinator.resume(id).await
    }

    pub async fn pending_postings(&self) -> Result<Vec<PurchaseRecord>, PostingError> {
        self.coordinator.pending().await
    }
}

/// Build the service graph from settings.
///
/// Without a database URL both stores live in memory. With one, ledger and
/// inventory share a single SQLite pool.
pub async fn build_services(settings: &Settings) -> anyhow::Result<PurchaseBook> {
    let (ledger, inventory): (DynLedger, DynInventory) = match settings.database_url.as_deref() {
        None => (
            Arc::new(InMemoryPurchaseLedger::new()),
            Arc::new(InMemoryInventory::new()),
        ),
        Some(url) => {
            let pool = db::connect(url).await?;
            let ledger = SqlitePurchaseLedger::new(pool.clone())
                .await
                .context("initialize purchase ledger")?;
            let inventory = SqliteInventory::new(pool)
                .await
                .context("initialize inventory")?;
            tracing::info!("using sqlite stores");
            (Arc::new(ledger), Arc::new(inventory))
        }
    };

    Ok(PurchaseBook::new(PostingCoordinator::with_config(
        ledger,
        inventory,
        settings.posting_config(),
    )))
}
