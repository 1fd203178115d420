//! Infrastructure layer: ledger and catalog storage, checkout orchestration,
//! configuration and background workers.
//!
//! The pure rules live in `rentwise-rentals`; this crate decides where state
//! is kept and how writes that commit capacity are serialised.

pub mod availability;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod payments;
pub mod retry;

#[cfg(test)]
mod integration_tests;

pub use availability::AvailabilityCalculator;
pub use catalog::{Catalog, InMemoryCatalog};
pub use config::EngineConfig;
pub use coordinator::{CartReservationCoordinator, Checkout, CheckoutError};
pub use engine::{AddToCart, ReservationEngine};
pub use error::StoreError;
pub use ledger::{InMemoryLedger, Promotion, ReservationLedger};
pub use payments::{PaymentEvent, PaymentEventWorker, WorkerHandle};
pub use retry::{BackoffStrategy, RetryError, RetryPolicy};
