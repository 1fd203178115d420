//! Sweep-line computation of remaining capacity over a window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentwise_core::{DateRange, ReservationId};

/// One active reservation's contribution: `quantity` units over its effective interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedSpan {
    pub reservation_id: ReservationId,
    pub quantity: i64,
    pub interval: DateRange,
}

/// Maximum number of units simultaneously committed anywhere inside `window`.
///
/// Each span is clipped to the window and turned into a `+quantity` event at
/// its start and a `-quantity` event at its end. Events are ordered by time,
/// with releases before acquisitions at the same instant so back-to-back
/// spans never count as concurrent. The peak of the running sum is the answer.
/// Summing every overlapping span instead would overstate demand whenever
/// spans occupy disjoint parts of the window.
pub fn peak_commitment(spans: &[CommittedSpan], window: &DateRange) -> i64 {
    let mut events: Vec<(DateTime<Utc>, i64)> = Vec::with_capacity(spans.len() * 2);
    for span in spans {
        if let Some(clipped) = span.interval.intersection(window) {
            events.push((clipped.start(), span.quantity));
            events.push((clipped.end(), -span.quantity));
        }
    }

    // (time, delta): negative deltas sort first on ties.
    events.sort_unstable();

    let mut running = 0i64;
    let mut peak = 0i64;
    for (_, delta) in events {
        running += delta;
        peak = peak.max(running);
    }
    peak
}

/// `capacity - peak`, floored at zero.
///
/// Zero also covers the case where an administrator shrank the pool below
/// what is already committed.
pub fn remaining_capacity(capacity: i64, spans: &[CommittedSpan], window: &DateRange) -> i64 {
    (capacity - peak_commitment(spans, window)).max(0)
}
