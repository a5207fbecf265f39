//! Purchasing domain module (supplier purchase ledger entries).
//!
//! This crate contains business rules for purchase records, implemented purely
//! as deterministic domain logic (no IO, no storage).

pub mod money;
pub mod record;

pub use money::{MAX_QUANTITY, MAX_UNIT_PRICE, Quantity, UnitPrice, compute_total};
pub use record::{PostingClaim, PurchaseDraft, PurchaseFields, PurchaseRecord};
