use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::Utc;

use purchasebook_core::PurchaseId;
use purchasebook_purchasing::{PostingClaim, PurchaseDraft, PurchaseRecord};

use super::r#trait::{LedgerError, PurchaseLedger, ensure_editable, sort_for_listing};

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    records: BTreeMap<PurchaseId, PurchaseRecord>,
}

/// In-memory purchase ledger.
///
/// Intended for tests/dev and single-process embedding. A single `RwLock`
/// serializes writers, which makes every compare-and-set trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryPurchaseLedger {
    inner: RwLock<Inner>,
}

impl InMemoryPurchaseLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> Result<T, LedgerError>) -> Result<T, LedgerError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| LedgerError::Persistence("lock poisoned".to_string()))?;
        f(&inner)
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut Inner) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| LedgerError::Persistence("lock poisoned".to_string()))?;
        f(&mut inner)
    }
}

impl Inner {
    fn record_mut(&mut self, id: PurchaseId) -> Result<&mut PurchaseRecord, LedgerError> {
        self.records.get_mut(&id).ok_or(LedgerError::NotFound(id))
    }
}

#[async_trait::async_trait]
impl PurchaseLedger for InMemoryPurchaseLedger {
    async fn create(&self, draft: PurchaseDraft) -> Result<PurchaseRecord, LedgerError> {
        let fields = draft.validate()?;
        self.write(|inner| {
            inner.next_id += 1;
            let id = PurchaseId::new(inner.next_id);
            let record = PurchaseRecord::new(id, Utc::now(), fields);
            inner.records.insert(id, record.clone());
            Ok(record)
        })
    }

    async fn get(&self, id: PurchaseId) -> Result<PurchaseRecord, LedgerError> {
        self.read(|inner| inner.records.get(&id).cloned().ok_or(LedgerError::NotFound(id)))
    }

    async fn list(&self) -> Result<Vec<PurchaseRecord>, LedgerError> {
        let mut records =
            self.read(|inner| Ok(inner.records.values().cloned().collect::<Vec<_>>()))?;
        sort_for_listing(&mut records);
        Ok(records)
    }

    async fn update(
        &self,
        id: PurchaseId,
        draft: PurchaseDraft,
    ) -> Result<PurchaseRecord, LedgerError> {
        self.write(|inner| {
            let record = inner.record_mut(id)?;
            ensure_editable(record)?;
            let fields = draft.validate()?;
            record
                .apply_edit(fields)
                .map_err(|e| LedgerError::from_domain(Some(id), e))?;
            Ok(record.clone())
        })
    }

    async fn delete(&self, id: PurchaseId) -> Result<(), LedgerError> {
        self.write(|inner| {
            ensure_editable(inner.record_mut(id)?)?;
            inner.records.remove(&id);
            Ok(())
        })
    }

    async fn begin_posting(&self, id: PurchaseId) -> Result<PostingClaim, LedgerError> {
        self.write(|inner| Ok(inner.record_mut(id)?.begin_posting(Utc::now())))
    }

    async fn release_posting(&self, id: PurchaseId) -> Result<(), LedgerError> {
        self.write(|inner| {
            inner.record_mut(id)?.release_posting();
            Ok(())
        })
    }

    async fn mark_posted(&self, id: PurchaseId) -> Result<bool, LedgerError> {
        self.write(|inner| Ok(inner.record_mut(id)?.mark_posted()))
    }

    async fn pending_postings(&self) -> Result<Vec<PurchaseRecord>, LedgerError> {
        let mut records = self.read(|inner| {
            Ok(inner
                .records
                .values()
                .filter(|r| r.is_posting_in_progress())
                .cloned()
                .collect::<Vec<_>>())
        })?;
        sort_for_listing(&mut records);
        Ok(records)
    }
}
