//! Ledger-backed availability queries.

use rentwise_core::{DateRange, DomainResult, VariantId};
use rentwise_rentals::{VariantSnapshot, remaining_capacity};

use crate::catalog::Catalog;
use crate::ledger::ReservationLedger;

/// Answers `available(variant, window)` from the ledger and the catalog.
///
/// Holds no state of its own. Results are advisory: a checkout re-checks
/// against a fresh snapshot and commits only if that snapshot is still current.
#[derive(Debug, Clone)]
pub struct AvailabilityCalculator<L, C> {
    ledger: L,
    catalog: C,
}

impl<L, C> AvailabilityCalculator<L, C>
where
    L: ReservationLedger,
    C: Catalog,
{
    pub fn new(ledger: L, catalog: C) -> Self {
        Self { ledger, catalog }
    }

    /// Units of `variant_id` free for the whole of `window`.
    pub fn available(&self, variant_id: VariantId, window: &DateRange) -> DomainResult<i64> {
        let capacity = self.catalog.capacity(variant_id)?;
        let spans = self.ledger.active_overlapping(variant_id, window)?;
        Ok(remaining_capacity(capacity, &spans, window))
    }

    /// Capacity, committed spans and commit version for one variant, read together.
    ///
    /// `window` should cover every line of the variant being checked.
    pub fn snapshot(
        &self,
        variant_id: VariantId,
        window: &DateRange,
    ) -> DomainResult<VariantSnapshot> {
        let (version, committed) = self.ledger.committed_snapshot(variant_id, window)?;
        let capacity = self.catalog.capacity(variant_id)?;
        Ok(VariantSnapshot {
            variant_id,
            capacity,
            committed,
            version,
        })
    }
}
