use std::sync::Arc;

use thiserror::Error;

use purchasebook_core::{DomainError, PurchaseId};
use purchasebook_purchasing::{PostingClaim, PurchaseDraft, PurchaseRecord};

/// Ledger store operation error.
///
/// Domain rejections (validation, immutability of posted records) and storage
/// failures share one enum so callers can match on exactly what went wrong.
/// Nothing here is retried internally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("purchase {0} not found")]
    NotFound(PurchaseId),

    #[error("purchase {0} is already posted and cannot be changed")]
    AlreadyPosted(PurchaseId),

    #[error("purchase {0} is being posted and cannot be changed")]
    PostingInProgress(PurchaseId),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl LedgerError {
    /// Map a domain error raised while working on a specific record.
    pub fn from_domain(id: Option<PurchaseId>, err: DomainError) -> Self {
        match (err, id) {
            (DomainError::Validation(msg), _) | (DomainError::InvalidId(msg), _) => {
                LedgerError::Validation(msg)
            }
            (DomainError::InvariantViolation(_), Some(id)) => LedgerError::AlreadyPosted(id),
            (DomainError::Conflict(_), Some(id)) => LedgerError::PostingInProgress(id),
            (other, None) => LedgerError::Validation(other.to_string()),
        }
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        LedgerError::from_domain(None, value)
    }
}

/// Refuse changes to posted or in-flight records.
pub(crate) fn ensure_editable(record: &PurchaseRecord) -> Result<(), LedgerError> {
    record
        .ensure_mutable()
        .map_err(|e| LedgerError::from_domain(Some(record.id_typed()), e))
}

/// Durable collection of purchase records.
///
/// ## Ordering
///
/// `list()` returns records by `purchase_date` descending, ties broken by id
/// descending.
///
/// ## Posting transitions
///
/// `begin_posting` and `mark_posted` are compare-and-set operations and must be
/// atomic per record: of any number of concurrent callers, exactly one sees
/// `PostingClaim::Claimed` / `true`. Operations on different ids are
/// independent.
#[async_trait::async_trait]
pub trait PurchaseLedger: Send + Sync {
    /// Validate and persist a new unposted record; the store assigns id and date.
    async fn create(&self, draft: PurchaseDraft) -> Result<PurchaseRecord, LedgerError>;

    async fn get(&self, id: PurchaseId) -> Result<PurchaseRecord, LedgerError>;

    async fn list(&self) -> Result<Vec<PurchaseRecord>, LedgerError>;

    /// Replace the editable fields of an unposted, unclaimed record.
    async fn update(
        &self,
        id: PurchaseId,
        draft: PurchaseDraft,
    ) -> Result<PurchaseRecord, LedgerError>;

    /// Remove an unposted, unclaimed record.
    async fn delete(&self, id: PurchaseId) -> Result<(), LedgerError>;

    /// Record the intent to post (compare-and-set on the intent marker).
    async fn begin_posting(&self, id: PurchaseId) -> Result<PostingClaim, LedgerError>;

    /// Clear the intent of an unposted record (after a definitive inventory failure).
    async fn release_posting(&self, id: PurchaseId) -> Result<(), LedgerError>;

    /// Set `posted = true` if currently false. Returns whether the transition happened.
    async fn mark_posted(&self, id: PurchaseId) -> Result<bool, LedgerError>;

    /// Unposted records that carry a posting intent (in flight or stranded).
    async fn pending_postings(&self) -> Result<Vec<PurchaseRecord>, LedgerError>;
}

#[async_trait::async_trait]
impl<S> PurchaseLedger for Arc<S>
where
    S: PurchaseLedger + ?Sized,
{
    async fn create(&self, draft: PurchaseDraft) -> Result<PurchaseRecord, LedgerError> {
        (**self).create(draft).await
    }

    async fn get(&self, id: PurchaseId) -> Result<PurchaseRecord, LedgerError> {
        (**self).get(id).await
    }

    async fn list(&self) -> Result<Vec<PurchaseRecord>, LedgerError> {
        (**self).list().await
    }

    async fn update(
        &self,
        id: PurchaseId,
        draft: PurchaseDraft,
    ) -> Result<PurchaseRecord, LedgerError> {
        (**self).update(id, draft).await
    }

    async fn delete(&self, id: PurchaseId) -> Result<(), LedgerError> {
        (**self).delete(id).await
    }

    async fn begin_posting(&self, id: PurchaseId) -> Result<PostingClaim, LedgerError> {
        (**self).begin_posting(id).await
    }

    async fn release_posting(&self, id: PurchaseId) -> Result<(), LedgerError> {
        (**self).release_posting(id).await
    }

    async fn mark_posted(&self, id: PurchaseId) -> Result<bool, LedgerError> {
        (**self).mark_posted(id).await
    }

    async fn pending_postings(&self) -> Result<Vec<PurchaseRecord>, LedgerError> {
        (**self).pending_postings().await
    }
}

/// Presentation order shared by all backends.
pub(crate) fn sort_for_listing(records: &mut [PurchaseRecord]) {
    records.sort_by(|a, b| {
        b.purchase_date()
            .cmp(&a.purchase_date())
            .then_with(|| b.id_typed().cmp(&a.id_typed()))
    });
}
