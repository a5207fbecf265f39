use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use purchasebook_core::{DomainError, DomainResult, PurchaseId};

use crate::money::{Quantity, UnitPrice, compute_total};

/// Caller input for creating or editing a purchase (unvalidated).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseDraft {
    pub supplier: String,
    pub product: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PurchaseDraft {
    pub fn new(
        supplier: impl Into<String>,
        product: impl Into<String>,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> Self {
        Self {
            supplier: supplier.into(),
            product: product.into(),
            quantity,
            unit_price,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Validate and normalize (trimmed text, blank notes dropped).
    pub fn validate(&self) -> DomainResult<PurchaseFields> {
        let supplier = non_blank("supplier", &self.supplier)?;
        let product = non_blank("product", &self.product)?;
        let quantity = Quantity::new(self.quantity)?;
        let unit_price = UnitPrice::new(self.unit_price)?;
        let notes = self
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        Ok(PurchaseFields {
            supplier,
            product,
            quantity,
            unit_price,
            notes,
        })
    }
}

fn non_blank(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be blank")));
    }
    Ok(trimmed.to_string())
}

/// The editable part of a purchase record, already validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseFields {
    pub supplier: String,
    pub product: String,
    pub quantity: Quantity,
    pub unit_price: UnitPrice,
    pub notes: Option<String>,
}

/// Result of trying to claim a record for posting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostingClaim {
    /// The caller won the claim and must now apply the purchase to inventory.
    Claimed(PurchaseRecord),
    /// Nothing to do; the record was posted earlier.
    AlreadyPosted(PurchaseRecord),
    /// Another caller holds the claim (or crashed while holding it).
    InProgress(PurchaseRecord),
}

/// One supplier purchase line item.
///
/// `total` is derived and kept equal to `quantity * unit_price`; the fields are
/// private so nothing can break that. `posted` only ever goes `false -> true`.
/// Deserialization re-checks both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PurchaseRecordRepr")]
pub struct PurchaseRecord {
    id: PurchaseId,
    purchase_date: DateTime<Utc>,
    supplier: String,
    product: String,
    quantity: Quantity,
    unit_price: UnitPrice,
    total: Decimal,
    notes: Option<String>,
    posted: bool,
    posting_started_at: Option<DateTime<Utc>>,
}

/// Wire shape of `PurchaseRecord`; only reachable through `TryFrom`.
#[derive(Deserialize)]
struct PurchaseRecordRepr {
    id: PurchaseId,
    purchase_date: DateTime<Utc>,
    supplier: String,
    product: String,
    quantity: Quantity,
    unit_price: UnitPrice,
    total: Decimal,
    #[serde(default)]
    notes: Option<String>,
    posted: bool,
    #[serde(default)]
    posting_started_at: Option<DateTime<Utc>>,
}

impl TryFrom<PurchaseRecordRepr> for PurchaseRecord {
    type Error = DomainError;

    fn try_from(repr: PurchaseRecordRepr) -> Result<Self, Self::Error> {
        let expected = compute_total(repr.quantity, repr.unit_price);
        if repr.total != expected {
            return Err(DomainError::validation(format!(
                "total {} does not match quantity * unit_price = {expected}",
                repr.total
            )));
        }
        if repr.posted && repr.posting_started_at.is_some() {
            return Err(DomainError::invariant(format!(
                "purchase {} is posted but still carries a posting intent",
                repr.id
            )));
        }

        let fields = PurchaseFields {
            supplier: non_blank("supplier", &repr.supplier)?,
            product: non_blank("product", &repr.product)?,
            quantity: repr.quantity,
            unit_price: repr.unit_price,
            notes: repr
                .notes
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        };
        Ok(Self::restore(
            repr.id,
            repr.purchase_date,
            fields,
            repr.posted,
            repr.posting_started_at,
        ))
    }
}

impl PurchaseRecord {
    /// Build a freshly created, unposted record.
    pub fn new(id: PurchaseId, purchase_date: DateTime<Utc>, fields: PurchaseFields) -> Self {
        Self {
            id,
            purchase_date,
            total: compute_total(fields.quantity, fields.unit_price),
            supplier: fields.supplier,
            product: fields.product,
            quantity: fields.quantity,
            unit_price: fields.unit_price,
            notes: fields.notes,
            posted: false,
            posting_started_at: None,
        }
    }

    /// Rehydrate a record from storage. The total is recomputed, never trusted.
    pub fn restore(
        id: PurchaseId,
        purchase_date: DateTime<Utc>,
        fields: PurchaseFields,
        posted: bool,
        posting_started_at: Option<DateTime<Utc>>,
    ) -> Self {
        let mut record = Self::new(id, purchase_date, fields);
        record.posted = posted;
        record.posting_started_at = if posted { None } else { posting_started_at };
        record
    }

    pub fn id_typed(&self) -> PurchaseId {
        self.id
    }

    pub fn purchase_date(&self) -> DateTime<Utc> {
        self.purchase_date
    }

    pub fn supplier(&self) -> &str {
        &self.supplier
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn unit_price(&self) -> UnitPrice {
        self.unit_price
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn is_posted(&self) -> bool {
        self.posted
    }

    /// When the current posting attempt recorded its intent, if one is in flight.
    pub fn posting_started_at(&self) -> Option<DateTime<Utc>> {
        self.posting_started_at
    }

    pub fn is_posting_in_progress(&self) -> bool {
        !self.posted && self.posting_started_at.is_some()
    }

    /// Replace the editable fields. Only allowed while unposted and unclaimed.
    pub fn apply_edit(&mut self, fields: PurchaseFields) -> DomainResult<()> {
        self.ensure_mutable()?;
        self.total = compute_total(fields.quantity, fields.unit_price);
        self.supplier = fields.supplier;
        self.product = fields.product;
        self.quantity = fields.quantity;
        self.unit_price = fields.unit_price;
        self.notes = fields.notes;
        Ok(())
    }

    /// Posted or in-flight records are frozen.
    pub fn ensure_mutable(&self) -> DomainResult<()> {
        if self.posted {
            return Err(DomainError::invariant(format!(
                "purchase {} is posted and cannot be changed",
                self.id
            )));
        }
        if self.posting_started_at.is_some() {
            return Err(DomainError::conflict(format!(
                "purchase {} is being posted",
                self.id
            )));
        }
        Ok(())
    }

    /// Compare-and-set on the posting intent.
    pub fn begin_posting(&mut self, at: DateTime<Utc>) -> PostingClaim {
        if self.posted {
            return PostingClaim::AlreadyPosted(self.clone());
        }
        if self.posting_started_at.is_some() {
            return PostingClaim::InProgress(self.clone());
        }
        self.posting_started_at = Some(at);
        PostingClaim::Claimed(self.clone())
    }

    /// Drop the posting intent of an unposted record. No-op otherwise.
    pub fn release_posting(&mut self) {
        if !self.posted {
            self.posting_started_at = None;
        }
    }

    /// Compare-and-set `posted: false -> true`. Returns whether it transitioned.
    pub fn mark_posted(&mut self) -> bool {
        if self.posted {
            return false;
        }
        self.posted = true;
        self.posting_started_at = None;
        true
    }

    /// The validated editable fields, e.g. for persisting.
    pub fn fields(&self) -> PurchaseFields {
        PurchaseFields {
            supplier: self.supplier.clone(),
            product: self.product.clone(),
            quantity: self.quantity,
            unit_price: self.unit_price,
            notes: self.notes.clone(),
        }
    }
}
