//! Facts recorded by the reservation ledger.
//!
//! The ledger never edits or deletes: every write is one or more of these
//! facts, and current state is what you get by applying them in order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentwise_core::{CartId, CustomerId, OrderId, ReservationId};
use rentwise_events::Event;

use crate::order::{Order, OrderStatus};
use crate::reservation::{Reservation, ReservationStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartOpened {
    pub cart_id: CartId,
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationAppended {
    pub reservation: Reservation,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationStatusChanged {
    pub reservation_id: ReservationId,
    pub from: ReservationStatus,
    pub to: ReservationStatus,
    /// When the new status took effect (drives early-return truncation).
    pub occurred_at: DateTime<Utc>,
}

/// A cart was promoted: the order now exists and every listed line is owned by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order: Order,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    CartOpened(CartOpened),
    ReservationAppended(ReservationAppended),
    ReservationStatusChanged(ReservationStatusChanged),
    OrderPlaced(OrderPlaced),
    OrderStatusChanged(OrderStatusChanged),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::CartOpened(_) => "rental.cart.opened",
            LedgerEvent::ReservationAppended(_) => "rental.reservation.appended",
            LedgerEvent::ReservationStatusChanged(_) => "rental.reservation.status_changed",
            LedgerEvent::OrderPlaced(_) => "rental.order.placed",
            LedgerEvent::OrderStatusChanged(_) => "rental.order.status_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::CartOpened(e) => e.occurred_at,
            LedgerEvent::ReservationAppended(e) => e.occurred_at,
            LedgerEvent::ReservationStatusChanged(e) => e.occurred_at,
            LedgerEvent::OrderPlaced(e) => e.occurred_at,
            LedgerEvent::OrderStatusChanged(e) => e.occurred_at,
        }
    }
}
