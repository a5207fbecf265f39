//! End-to-end tests for the purchase book.
//!
//! Flow: PurchaseBook → Ledger → PostingCoordinator → Inventory
//!
//! Every scenario runs against both backends (in-memory and SQLite):
//! - record, post, stock applied exactly once
//! - repeated / concurrent posting never double-applies
//! - inventory failures leave the record unposted and retryable
//! - timeouts strand an intent that `resume` finishes without double-applying

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use purchasebook_core::PurchaseId;
    use purchasebook_inventory::StockReceipt;
    use purchasebook_purchasing::PurchaseDraft;

    use crate::config::{PostingConfig, Settings};
    use crate::db;
    use crate::inventory::{
        InMemoryInventory, Inventory, InventoryError, SqliteInventory, StockApplied,
    };
    use crate::ledger::{InMemoryPurchaseLedger, LedgerError, SqlitePurchaseLedger};
    use crate::posting::{PostOutcome, PostingCoordinator, PostingError};
    use crate::services::{DynInventory, DynLedger, PurchaseBook, build_services};

    #[derive(Debug, Clone, Copy)]
    enum Backend {
        Memory,
        Sqlite,
    }

    const BACKENDS: [Backend; 2] = [Backend::Memory, Backend::Sqlite];

    /// Wraps a real inventory; can fail or hang on demand and counts calls.
    struct ScriptedInventory {
        inner: DynInventory,
        attempts: AtomicUsize,
        failures: AtomicUsize,
        hang_after_apply: AtomicBool,
    }

    impl ScriptedInventory {
        fn new(inner: DynInventory) -> Self {
            Self {
                inner,
                attempts: AtomicUsize::new(0),
                failures: AtomicUsize::new(0),
                hang_after_apply: AtomicBool::new(false),
            }
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        fn fail_next(&self, times: usize) {
            self.failures.store(times, Ordering::SeqCst);
        }

        /// Apply the next receipt, then never answer.
        fn hang_next(&self) {
            self.hang_after_apply.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl Inventory for ScriptedInventory {
        async fn add_stock(&self, receipt: &StockReceipt) -> Result<StockApplied, InventoryError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(InventoryError::Unavailable("connection reset".to_string()));
            }

            let applied = self.inner.add_stock(receipt).await;
            if self.hang_after_apply.swap(false, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            applied
        }
    }

    enum StockProbe {
        Memory(Arc<InMemoryInventory>),
        Sqlite(Arc<SqliteInventory>),
    }

    impl StockProbe {
        async fn stock(&self, product: &str) -> Decimal {
            let level = match self {
                StockProbe::Memory(inv) => inv.stock_level(product),
                StockProbe::Sqlite(inv) => inv.stock_level(product).await.unwrap(),
            };
            level.map(|l| l.quantity).unwrap_or_default()
        }
    }

    struct Fixture {
        book: Arc<PurchaseBook>,
        inventory: Arc<ScriptedInventory>,
        probe: StockProbe,
    }

    async fn setup(backend: Backend, timeout: Option<Duration>) -> Fixture {
        purchasebook_observability::init_for_tests();

        let (ledger, real, probe): (DynLedger, DynInventory, StockProbe) = match backend {
            Backend::Memory => {
                let inv = Arc::new(InMemoryInventory::new());
                (
                    Arc::new(InMemoryPurchaseLedger::new()),
                    inv.clone(),
                    StockProbe::Memory(inv),
                )
            }
            Backend::Sqlite => {
                let pool = db::connect_in_memory().await.unwrap();
                let ledger = SqlitePurchaseLedger::new(pool.clone()).await.unwrap();
                let inv = Arc::new(SqliteInventory::new(pool).await.unwrap());
                (Arc::new(ledger), inv.clone(), StockProbe::Sqlite(inv))
            }
        };

        let inventory = Arc::new(ScriptedInventory::new(real));
        let coordinator = PostingCoordinator::with_config(
            ledger,
            inventory.clone() as DynInventory,
            PostingConfig {
                inventory_timeout: timeout,
            },
        );

        Fixture {
            book: Arc::new(PurchaseBook::new(coordinator)),
            inventory,
            probe,
        }
    }

    fn file_settings(dir: &TempDir) -> Settings {
        Settings {
            database_url: Some(format!("sqlite://{}", dir.path().join("purchases.db").display())),
            inventory_timeout: None,
        }
    }

    /// Read stock through a fresh pool on the same database file.
    async fn file_stock(settings: &Settings, product: &str) -> Decimal {
        let pool = db::connect(settings.database_url.as_deref().unwrap()).await.unwrap();
        let inventory = SqliteInventory::new(pool).await.unwrap();
        inventory
            .stock_level(product)
            .await
            .unwrap()
            .map(|l| l.quantity)
            .unwrap_or_default()
    }

    fn acme_widgets() -> PurchaseDraft {
        PurchaseDraft::new("ACME", "Widget", Decimal::new(10, 0), Decimal::new(250, 2))
    }

    #[tokio::test]
    async fn record_and_post_applies_stock_once() {
        for backend in BACKENDS {
            let fx = setup(backend, None).await;

            let record = fx.book.create(acme_widgets()).await.unwrap();
            assert_eq!(record.total(), Decimal::new(2500, 2), "{backend:?}");
            assert!(!record.is_posted());

            let outcome = fx.book.post(record.id_typed()).await.unwrap();
            assert!(matches!(outcome, PostOutcome::Posted(ref r) if r.is_posted()), "{backend:?}");
            assert_eq!(fx.inventory.attempts(), 1, "{backend:?}");
            assert_eq!(fx.probe.stock("Widget").await, Decimal::new(10, 0), "{backend:?}");

            let stored = fx.book.get(record.id_typed()).await.unwrap();
            assert!(stored.is_posted(), "{backend:?}");
        }
    }

    #[tokio::test]
    async fn posting_twice_reports_already_posted() {
        for backend in BACKENDS {
            let fx = setup(backend, None).await;
            let id = fx.book.create(acme_widgets()).await.unwrap().id_typed();

            fx.book.post(id).await.unwrap();
            let again = fx.book.post(id).await.unwrap();

            assert!(matches!(again, PostOutcome::AlreadyPosted(_)), "{backend:?}");
            assert_eq!(fx.inventory.attempts(), 1, "{backend:?}");
            assert_eq!(fx.probe.stock("Widget").await, Decimal::new(10, 0), "{backend:?}");
        }
    }

    #[tokio::test]
    async fn posting_unknown_id_touches_nothing() {
        for backend in BACKENDS {
            let fx = setup(backend, None).await;
            fx.book.create(acme_widgets()).await.unwrap();

            let err = fx.book.post(PurchaseId::new(9999)).await.unwrap_err();
            assert_eq!(err, PostingError::NotFound(PurchaseId::new(9999)), "{backend:?}");
            assert_eq!(fx.inventory.attempts(), 0, "{backend:?}");
        }
    }

    #[tokio::test]
    async fn inventory_failure_then_retry_applies_one_delta() {
        for backend in BACKENDS {
            let fx = setup(backend, None).await;
            let id = fx.book.create(acme_widgets()).await.unwrap().id_typed();

            fx.inventory.fail_next(1);
            let err = fx.book.post(id).await.unwrap_err();
            assert!(matches!(err, PostingError::InventoryApply { .. }), "{backend:?}");

            let record = fx.book.get(id).await.unwrap();
            assert!(!record.is_posted(), "{backend:?}");
            assert!(fx.book.pending_postings().await.unwrap().is_empty(), "{backend:?}");
            assert_eq!(fx.probe.stock("Widget").await, Decimal::ZERO, "{backend:?}");

            assert!(matches!(fx.book.post(id).await.unwrap(), PostOutcome::Posted(_)));
            assert_eq!(fx.probe.stock("Widget").await, Decimal::new(10, 0), "{backend:?}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_posts_apply_one_delta() {
        for backend in BACKENDS {
            let fx = setup(backend, None).await;
            let id = fx.book.create(acme_widgets()).await.unwrap().id_typed();

            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let book = fx.book.clone();
                    tokio::spawn(async move { book.post(id).await })
                })
                .collect();

            let mut posted = 0;
            for handle in handles {
                if let PostOutcome::Posted(_) = handle.await.unwrap().unwrap() {
                    posted += 1;
                }
            }

            assert_eq!(posted, 1, "{backend:?}");
            assert_eq!(fx.inventory.attempts(), 1, "{backend:?}");
            assert_eq!(fx.probe.stock("Widget").await, Decimal::new(10, 0), "{backend:?}");
            assert!(fx.book.get(id).await.unwrap().is_posted(), "{backend:?}");
        }
    }

    #[tokio::test]
    async fn timeout_strands_intent_and_resume_finishes_without_double_apply() {
        for backend in BACKENDS {
            let fx = setup(backend, Some(Duration::from_millis(50))).await;
            let id = fx.book.create(acme_widgets()).await.unwrap().id_typed();

            // Inventory applies the delta but the answer is lost.
            fx.inventory.hang_next();
            let err = fx.book.post(id).await.unwrap_err();
            assert!(matches!(err, PostingError::InventoryTimeout { .. }), "{backend:?}");

            let pending = fx.book.pending_postings().await.unwrap();
            assert_eq!(pending.len(), 1, "{backend:?}");
            assert_eq!(pending[0].id_typed(), id);
            assert_eq!(
                fx.book.delete(id).await,
                Err(LedgerError::PostingInProgress(id)),
                "{backend:?}"
            );
            assert!(matches!(fx.book.post(id).await.unwrap(), PostOutcome::InProgress(_)));

            let outcome = fx.book.resume(id).await.unwrap();
            assert!(matches!(outcome, PostOutcome::Posted(ref r) if r.is_posted()), "{backend:?}");
            assert_eq!(fx.probe.stock("Widget").await, Decimal::new(10, 0), "{backend:?}");
            assert!(fx.book.pending_postings().await.unwrap().is_empty(), "{backend:?}");
            assert!(matches!(fx.book.resume(id).await.unwrap(), PostOutcome::AlreadyPosted(_)));
        }
    }

    #[tokio::test]
    async fn posted_records_are_immutable() {
        for backend in BACKENDS {
            let fx = setup(backend, None).await;
            let id = fx.book.create(acme_widgets()).await.unwrap().id_typed();

            let edited = fx
                .book
                .update(id, acme_widgets().with_notes("split delivery"))
                .await
                .unwrap();
            assert_eq!(edited.notes(), Some("split delivery"));

            fx.book.post(id).await.unwrap();
            assert_eq!(
                fx.book.update(id, acme_widgets()).await,
                Err(LedgerError::AlreadyPosted(id)),
                "{backend:?}"
            );
            assert_eq!(
                fx.book.delete(id).await,
                Err(LedgerError::AlreadyPosted(id)),
                "{backend:?}"
            );
        }
    }

    #[tokio::test]
    async fn sqlite_file_survives_reopen() {
        purchasebook_observability::init_for_tests();
        let dir = TempDir::new().unwrap();
        let settings = file_settings(&dir);

        let id = {
            let book = build_services(&settings).await.unwrap();
            let id = book.create(acme_widgets()).await.unwrap().id_typed();
            book.post(id).await.unwrap();
            id
        };

        let book = build_services(&settings).await.unwrap();
        let records = book.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_posted());
        assert!(matches!(book.post(id).await.unwrap(), PostOutcome::AlreadyPosted(_)));

        assert_eq!(file_stock(&settings, "Widget").await, Decimal::new(10, 0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn sqlite_file_concurrent_posts_of_one_purchase_apply_once() {
        purchasebook_observability::init_for_tests();
        let dir = TempDir::new().unwrap();
        let settings = file_settings(&dir);
        let book = Arc::new(build_services(&settings).await.unwrap());
        let id = book.create(acme_widgets()).await.unwrap().id_typed();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let book = book.clone();
                tokio::spawn(async move { book.post(id).await })
            })
            .collect();

        let mut posted = 0;
        for handle in handles {
            if let PostOutcome::Posted(_) = handle.await.unwrap().unwrap() {
                posted += 1;
            }
        }

        assert_eq!(posted, 1);
        assert!(book.get(id).await.unwrap().is_posted());
        assert_eq!(file_stock(&settings, "Widget").await, Decimal::new(10, 0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn sqlite_file_concurrent_posts_of_many_purchases_lose_no_stock() {
        purchasebook_observability::init_for_tests();
        let dir = TempDir::new().unwrap();
        let settings = file_settings(&dir);
        let book = Arc::new(build_services(&settings).await.unwrap());

        let mut ids = Vec::new();
        for _ in 0..16 {
            ids.push(book.create(acme_widgets()).await.unwrap().id_typed());
        }

        let handles: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let book = book.clone();
                tokio::spawn(async move { book.post(id).await })
            })
            .collect();

        for handle in handles {
            assert!(matches!(handle.await.unwrap().unwrap(), PostOutcome::Posted(_)));
        }

        assert!(book.pending_postings().await.unwrap().is_empty());
        assert_eq!(file_stock(&settings, "Widget").await, Decimal::new(160, 0));
    }

    #[tokio::test]
    async fn in_memory_services_from_default_settings() {
        let book = build_services(&Settings::default()).await.unwrap();
        let first = book.create(acme_widgets()).await.unwrap();
        let second = book
            .create(PurchaseDraft::new("Globex", "Gadget", Decimal::ONE, Decimal::new(99, 2)))
            .await
            .unwrap();

        let ids: Vec<_> = book.list().await.unwrap().iter().map(|r| r.id_typed()).collect();
        assert_eq!(ids, vec![second.id_typed(), first.id_typed()]);
    }
}
