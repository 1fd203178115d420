//! Checkout decision: can every line of a cart be committed right now?

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use rentwise_core::{DateRange, DomainError, ReservationId, VariantId};

use crate::availability::{CommittedSpan, remaining_capacity};
use crate::reservation::Reservation;

/// Everything checkout needs to know about one variant, read at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSnapshot {
    pub variant_id: VariantId,
    pub capacity: i64,
    /// Active order-owned spans overlapping the cart's lines for this variant.
    pub committed: Vec<CommittedSpan>,
    /// Commit version the snapshot was read at.
    pub version: u64,
}

/// A cart line that does not fit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailingLine {
    pub reservation_id: ReservationId,
    pub variant_id: VariantId,
    pub period: DateRange,
    pub requested: i64,
    pub available: i64,
}

impl FailingLine {
    pub fn to_error(&self) -> DomainError {
        DomainError::InsufficientStock {
            variant_id: self.variant_id,
            requested: self.requested,
            available: self.available,
        }
    }
}

/// The outcome of a successful check: which lines to promote and the order total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutPlan {
    pub line_ids: Vec<ReservationId>,
    pub total: u64,
}

/// Check every line against committed stock.
///
/// Lines of the same cart compete with each other too: within a variant they
/// are admitted in creation order and each admitted line counts against the
/// ones after it. A line that does not fit is reported and not admitted. A
/// variant without a snapshot has no capacity.
pub fn plan_checkout(
    lines: &[Reservation],
    snapshots: &BTreeMap<VariantId, VariantSnapshot>,
) -> Result<CheckoutPlan, Vec<FailingLine>> {
    let mut ordered: Vec<&Reservation> = lines.iter().collect();
    ordered.sort_by_key(|l| (l.variant_id(), l.created_at(), l.id_typed()));

    let mut admitted: BTreeMap<VariantId, Vec<CommittedSpan>> = BTreeMap::new();
    let mut failing = Vec::new();

    for line in ordered {
        let snapshot = snapshots.get(&line.variant_id());
        let capacity = snapshot.map(|s| s.capacity).unwrap_or(0);
        let same_cart = admitted.entry(line.variant_id()).or_default();

        let mut spans: Vec<CommittedSpan> =
            snapshot.map(|s| s.committed.clone()).unwrap_or_default();
        spans.extend(same_cart.iter().cloned());

        let available = remaining_capacity(capacity, &spans, &line.period());
        if line.quantity() > available {
            failing.push(FailingLine {
                reservation_id: line.id_typed(),
                variant_id: line.variant_id(),
                period: line.period(),
                requested: line.quantity(),
                available,
            });
            continue;
        }

        same_cart.push(CommittedSpan {
            reservation_id: line.id_typed(),
            quantity: line.quantity(),
            interval: line.period(),
        });
    }

    if !failing.is_empty() {
        return Err(failing);
    }

    Ok(CheckoutPlan {
        line_ids: lines.iter().map(|l| l.id_typed()).collect(),
        total: lines.iter().fold(0u64, |acc, l| acc.saturating_add(l.line_total())),
    })
}
