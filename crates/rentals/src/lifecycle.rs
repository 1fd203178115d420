//! Order and reservation state machines.
//!
//! Every legal transition is listed once in a table; anything not in a table
//! is rejected with `InvalidStatusTransition` before any fact is produced.
//!
//! ```text
//! order:        pending ──paymentSucceeded──► confirmed ──complete──► completed
//!                  │                              │
//!                  ├──cancel──► cancelled         └──refund──► refunded
//!                  └──paymentFailed──► failed ◄──paymentFailed── confirmed
//!
//! reservation:  pending ──distribute──► distributed ──recover──► recovered
//!                  ├──cancel──► cancelled
//!                  └──refund──► refunded ◄──refund── distributed
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentwise_core::{AggregateRoot, DomainError, DomainResult, OrderId, ReservationId};

use crate::order::{Order, OrderStatus};
use crate::reservation::{Owner, Reservation, ReservationStatus};

/// Line-item lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationEvent {
    Distribute,
    Recover,
    Cancel,
    Refund,
}

/// Order lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEvent {
    PaymentSucceeded,
    PaymentFailed,
    Complete,
    Cancel,
    Refund,
}

impl core::fmt::Display for ReservationEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Distribute => "distribute",
            Self::Recover => "recover",
            Self::Cancel => "cancel",
            Self::Refund => "refund",
        })
    }
}

impl core::fmt::Display for OrderEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::PaymentSucceeded => "paymentSucceeded",
            Self::PaymentFailed => "paymentFailed",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
            Self::Refund => "refund",
        })
    }
}

const RESERVATION_TRANSITIONS: &[(ReservationStatus, ReservationEvent, ReservationStatus)] = &[
    (ReservationStatus::Pending, ReservationEvent::Distribute, ReservationStatus::Distributed),
    (ReservationStatus::Distributed, ReservationEvent::Recover, ReservationStatus::Recovered),
    (ReservationStatus::Pending, ReservationEvent::Cancel, ReservationStatus::Cancelled),
    (ReservationStatus::Pending, ReservationEvent::Refund, ReservationStatus::Refunded),
    (ReservationStatus::Distributed, ReservationEvent::Refund, ReservationStatus::Refunded),
];

const ORDER_TRANSITIONS: &[(OrderStatus, OrderEvent, OrderStatus)] = &[
    (OrderStatus::Pending, OrderEvent::PaymentSucceeded, OrderStatus::Confirmed),
    (OrderStatus::Confirmed, OrderEvent::Complete, OrderStatus::Completed),
    (OrderStatus::Pending, OrderEvent::Cancel, OrderStatus::Cancelled),
    (OrderStatus::Confirmed, OrderEvent::Refund, OrderStatus::Refunded),
    (OrderStatus::Pending, OrderEvent::PaymentFailed, OrderStatus::Failed),
    (OrderStatus::Confirmed, OrderEvent::PaymentFailed, OrderStatus::Failed),
];

/// A validated status change for one reservation.
///
/// `expected_version` and `owner` are what the decision was made against; the
/// ledger refuses the write if the row moved or changed hands in the meantime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub reservation_id: ReservationId,
    pub expected_version: u64,
    pub owner: Owner,
    pub from: ReservationStatus,
    pub to: ReservationStatus,
    pub occurred_at: DateTime<Utc>,
}

/// A validated order status change plus the line changes it cascades into.
///
/// Applied by the ledger as one atomic write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTransition {
    pub order_id: OrderId,
    pub expected_version: u64,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub occurred_at: DateTime<Utc>,
    pub line_changes: Vec<StatusChange>,
}

/// Single owner of every legal status transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderStatusStateMachine;

impl OrderStatusStateMachine {
    pub fn next_reservation_status(
        from: ReservationStatus,
        event: ReservationEvent,
    ) -> DomainResult<ReservationStatus> {
        RESERVATION_TRANSITIONS
            .iter()
            .find(|(f, e, _)| *f == from && *e == event)
            .map(|(_, _, to)| *to)
            .ok_or_else(|| DomainError::invalid_transition("reservation", from, event))
    }

    pub fn next_order_status(from: OrderStatus, event: OrderEvent) -> DomainResult<OrderStatus> {
        ORDER_TRANSITIONS
            .iter()
            .find(|(f, e, _)| *f == from && *e == event)
            .map(|(_, _, to)| *to)
            .ok_or_else(|| DomainError::invalid_transition("order", from, event))
    }

    /// Decide a single line-item transition.
    ///
    /// `parent` is the owning order (required for order-owned lines).
    /// Guards beyond the table:
    /// - cart lines only accept `cancel` (removal from the cart)
    /// - `distribute` requires a confirmed parent order
    /// - the effective time cannot precede the line's current status time
    pub fn reservation_transition(
        reservation: &Reservation,
        parent: Option<&Order>,
        event: ReservationEvent,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<StatusChange> {
        let from = reservation.status();
        let to = Self::next_reservation_status(from, event)?;

        match reservation.owner() {
            Owner::Cart(_) if event != ReservationEvent::Cancel => {
                return Err(DomainError::invalid_transition("cart line", from, event));
            }
            Owner::Cart(_) => {}
            Owner::Order(order_id) => {
                let order = parent
                    .filter(|o| o.id_typed() == order_id)
                    .ok_or_else(|| {
                        DomainError::owner_conflict(format!(
                            "reservation {} is owned by order {order_id}",
                            reservation.id_typed()
                        ))
                    })?;
                if event == ReservationEvent::Distribute
                    && order.status() != OrderStatus::Confirmed
                {
                    return Err(DomainError::invalid_transition(
                        "reservation",
                        format!("{from} in {} order", order.status()),
                        event,
                    ));
                }
            }
        }

        Self::ensure_not_backdated(reservation.status_changed_at(), occurred_at)?;

        Ok(StatusChange {
            reservation_id: reservation.id_typed(),
            expected_version: reservation.version(),
            owner: reservation.owner(),
            from,
            to,
            occurred_at,
        })
    }

    /// Decide an order transition and the line changes it implies.
    ///
    /// | event | lines |
    /// |-------|-------|
    /// | paymentSucceeded | unchanged |
    /// | paymentFailed | pending → cancelled |
    /// | cancel | pending → cancelled; rejected if any line is distributed |
    /// | refund | pending/distributed → refunded |
    /// | complete | rejected while any line is pending or distributed |
    pub fn order_transition(
        order: &Order,
        lines: &[Reservation],
        event: OrderEvent,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<OrderTransition> {
        let from = order.status();
        let to = Self::next_order_status(from, event)?;
        Self::ensure_not_backdated(order.status_changed_at(), occurred_at)?;

        let reject = |why: &str| {
            DomainError::invalid_transition("order", format!("{from} ({why})"), event)
        };

        let line_event = match event {
            OrderEvent::PaymentSucceeded => None,
            OrderEvent::PaymentFailed => Some(ReservationEvent::Cancel),
            OrderEvent::Cancel => {
                if lines.iter().any(|l| l.status() == ReservationStatus::Distributed) {
                    return Err(reject("line already distributed"));
                }
                Some(ReservationEvent::Cancel)
            }
            OrderEvent::Refund => Some(ReservationEvent::Refund),
            OrderEvent::Complete => {
                let out = |l: &Reservation| {
                    matches!(
                        l.status(),
                        ReservationStatus::Pending | ReservationStatus::Distributed
                    )
                };
                if lines.iter().any(out) {
                    return Err(reject("lines still out"));
                }
                None
            }
        };

        let mut line_changes = Vec::new();
        if let Some(line_event) = line_event {
            for line in lines {
                if line.owner() != Owner::Order(order.id_typed()) {
                    return Err(DomainError::owner_conflict(format!(
                        "reservation {} does not belong to order {}",
                        line.id_typed(),
                        order.id_typed()
                    )));
                }
                // Lines the event does not apply to (e.g. already recovered) keep their status.
                let Ok(line_to) = Self::next_reservation_status(line.status(), line_event) else {
                    continue;
                };
                line_changes.push(StatusChange {
                    reservation_id: line.id_typed(),
                    expected_version: line.version(),
                    owner: line.owner(),
                    from: line.status(),
                    to: line_to,
                    occurred_at: occurred_at.max(line.status_changed_at()),
                });
            }
        }

        Ok(OrderTransition {
            order_id: order.id_typed(),
            expected_version: order.version(),
            from,
            to,
            occurred_at,
            line_changes,
        })
    }

    fn ensure_not_backdated(current: DateTime<Utc>, requested: DateTime<Utc>) -> DomainResult<()> {
        if requested < current {
            return Err(DomainError::validation(format!(
                "transition at {requested} precedes the current status time {current}"
            )));
        }
        Ok(())
    }
}
