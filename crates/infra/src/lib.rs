//! Infrastructure layer: storage backends, inventory adapters, posting and wiring.

pub mod config;
pub mod db;
pub mod inventory;
pub mod ledger;
pub mod posting;
pub mod services;

#[cfg(test)]
mod integration_tests;

pub use config::{PostingConfig, Settings};
pub use posting::{PostOutcome, PostingCoordinator, PostingError};
pub use services::{PurchaseBook, build_services};
