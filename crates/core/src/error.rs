//! Domain error model.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::id::VariantId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant except [`DomainError::ConcurrencyConflict`] is deterministic:
/// retrying the same request against the same state fails the same way.
/// Variants carry enough structure for the caller to render a precise message
/// (which variant, requested vs. available).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A date range was empty or inverted (`start >= end`).
    #[error("invalid date range: start {start} must be before end {end}")]
    InvalidDateRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// A reservation quantity was zero or negative.
    #[error("invalid quantity {0}: must be positive")]
    InvalidQuantity(i64),

    /// More units were requested than are free over the requested range.
    #[error(
        "insufficient stock for variant {variant_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        variant_id: VariantId,
        requested: i64,
        available: i64,
    },

    /// A reservation's cart/order ownership would be violated.
    #[error("owner conflict: {0}")]
    OwnerConflict(String),

    /// The state machine has no edge for this (state, event) pair, or a guard failed.
    #[error("invalid status transition: {subject} in state '{from}' cannot accept '{event}'")]
    InvalidStatusTransition {
        subject: &'static str,
        from: String,
        event: String,
    },

    /// Lock or version contention; the only retryable variant.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Malformed input that is not covered by a more specific variant.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced cart, order, reservation or variant does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn owner_conflict(msg: impl Into<String>) -> Self {
        Self::OwnerConflict(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::ConcurrencyConflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_transition(
        subject: &'static str,
        from: impl core::fmt::Display,
        event: impl core::fmt::Display,
    ) -> Self {
        Self::InvalidStatusTransition {
            subject,
            from: from.to_string(),
            event: event.to_string(),
        }
    }

    /// Whether the failure came from contention and may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict(_))
    }
}
