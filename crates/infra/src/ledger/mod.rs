//! Purchase ledger storage.
//!
//! - `r#trait`: the `PurchaseLedger` contract and `LedgerError`
//! - `in_memory`: process-local backend for tests/dev
//! - `sqlite`: durable backend (table `purchases`)

pub mod in_memory;
pub mod sqlite;
pub mod r#trait;

pub use in_memory::InMemoryPurchaseLedger;
pub use r#trait::{LedgerError, PurchaseLedger};
pub use sqlite::SqlitePurchaseLedger;
