//! Storage-level errors shared by the ledger and the catalog.

use thiserror::Error;

use rentwise_core::DomainError;

/// Ledger/catalog operation error.
///
/// These are infrastructure outcomes (contention, missing rows, lock
/// poisoning) as opposed to domain decisions; callers see them as
/// [`DomainError`] through the `From` impl.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A version expectation did not hold (row or variant moved underneath the writer).
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    /// Writing would leave a reservation without exactly one owner.
    #[error("owner conflict: {0}")]
    OwnerConflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The write is malformed (duplicate id, stale transition source).
    #[error("invalid write: {0}")]
    Invalid(String),

    #[error("lock poisoned: {0}")]
    Poisoned(&'static str),
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => DomainError::ConcurrencyConflict(msg),
            StoreError::OwnerConflict(msg) => DomainError::OwnerConflict(msg),
            StoreError::NotFound(msg) => DomainError::NotFound(msg),
            StoreError::Invalid(msg) => DomainError::Validation(msg),
            // A poisoned lock means a writer panicked mid-update; nothing to retry against.
            StoreError::Poisoned(what) => {
                DomainError::Validation(format!("store unavailable: {what}"))
            }
        }
    }
}
