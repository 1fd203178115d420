//! Maps a reservation's lifecycle status onto the interval it still occupies.

use chrono::{DateTime, Utc};

use rentwise_core::DateRange;

use crate::availability::CommittedSpan;
use crate::reservation::{Owner, Reservation, ReservationStatus};

/// Pure mapping `(period, status, effective_at) -> effective interval`.
///
/// | status | effective interval |
/// |--------|--------------------|
/// | pending, distributed | full period |
/// | cancelled | none |
/// | refunded, never distributed | none |
/// | refunded after distribution, recovered | `[start, effective_at)`, capped at the full period |
///
/// A unit that was handed over keeps occupying its slot until the moment it
/// came back (or was written off by a refund); the unused tail is released.
#[derive(Debug, Clone, Copy, Default)]
pub struct StockMutationApplier;

impl StockMutationApplier {
    pub fn interval_for(
        period: DateRange,
        status: ReservationStatus,
        effective_at: DateTime<Utc>,
        was_distributed: bool,
    ) -> Option<DateRange> {
        match status {
            ReservationStatus::Pending | ReservationStatus::Distributed => Some(period),
            ReservationStatus::Cancelled => None,
            ReservationStatus::Refunded if !was_distributed => None,
            ReservationStatus::Refunded | ReservationStatus::Recovered => {
                period.truncated_at(effective_at)
            }
        }
    }

    pub fn effective_interval(reservation: &Reservation) -> Option<DateRange> {
        Self::interval_for(
            reservation.period(),
            reservation.status(),
            reservation.status_changed_at(),
            reservation.distributed_at().is_some(),
        )
    }

    /// What the reservation contributes to capacity consumption, if anything.
    ///
    /// Cart lines are soft holds and contribute nothing until checkout.
    pub fn committed_span(reservation: &Reservation) -> Option<CommittedSpan> {
        if !matches!(reservation.owner(), Owner::Order(_)) {
            return None;
        }
        Self::effective_interval(reservation).map(|interval| CommittedSpan {
            reservation_id: reservation.id_typed(),
            quantity: reservation.quantity(),
            interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn period() -> DateRange {
        DateRange::new(day(1), day(10)).unwrap()
    }

    fn interval(
        status: ReservationStatus,
        at: DateTime<Utc>,
        distributed: bool,
    ) -> Option<DateRange> {
        StockMutationApplier::interval_for(period(), status, at, distributed)
    }

    #[test]
    fn held_and_handed_over_lines_use_the_full_period() {
        for status in [ReservationStatus::Pending, ReservationStatus::Distributed] {
            assert_eq!(
                interval(status, day(3), status == ReservationStatus::Distributed),
                Some(period())
            );
        }
    }

    #[test]
    fn cancelled_and_undistributed_refunds_release_everything() {
        assert_eq!(interval(ReservationStatus::Cancelled, day(3), false), None);
        assert_eq!(interval(ReservationStatus::Refunded, day(3), false), None);
    }

    #[test]
    fn early_recovery_frees_the_tail() {
        assert_eq!(
            interval(ReservationStatus::Recovered, day(5), true),
            Some(DateRange::new(day(1), day(5)).unwrap())
        );
    }

    #[test]
    fn late_recovery_keeps_the_full_period() {
        assert_eq!(interval(ReservationStatus::Recovered, day(10), true), Some(period()));
        assert_eq!(interval(ReservationStatus::Recovered, day(15), true), Some(period()));
    }

    #[test]
    fn refund_after_distribution_truncates_like_a_return() {
        assert_eq!(
            interval(ReservationStatus::Refunded, day(4), true),
            Some(DateRange::new(day(1), day(4)).unwrap())
        );
    }
}
