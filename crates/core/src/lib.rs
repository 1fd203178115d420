//! `rentwise-core`: shared building blocks for the reservation engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the half-open [`DateRange`], version tracking and the error
//! taxonomy every other crate reports through.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod period;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{CartId, CustomerId, LocationId, OrderId, ReservationId, VariantId};
pub use period::DateRange;
