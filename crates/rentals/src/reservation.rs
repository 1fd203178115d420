use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentwise_core::{
    AggregateRoot, CartId, DateRange, DomainError, DomainResult, OrderId, ReservationId, VariantId,
};

use crate::facts::LedgerEvent;

/// Who a reservation belongs to.
///
/// Exactly one owner at a time: a mutable cart before checkout, an immutable
/// order afterwards.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Owner {
    Cart(CartId),
    Order(OrderId),
}

impl Owner {
    pub fn cart(&self) -> Option<CartId> {
        match self {
            Owner::Cart(id) => Some(*id),
            Owner::Order(_) => None,
        }
    }

    pub fn order(&self) -> Option<OrderId> {
        match self {
            Owner::Order(id) => Some(*id),
            Owner::Cart(_) => None,
        }
    }
}

/// Reservation (line item) lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    /// Held, not yet handed over.
    Pending,
    /// Physically handed over to the customer.
    Distributed,
    /// Returned.
    Recovered,
    Cancelled,
    Refunded,
}

impl core::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Distributed => "distributed",
            Self::Recovered => "recovered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        })
    }
}

/// Command: put a new line into a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReservation {
    pub reservation_id: ReservationId,
    pub cart_id: CartId,
    pub variant_id: VariantId,
    pub quantity: i64,
    pub period: DateRange,
    /// Catalog price at the time the line was added.
    pub price_per_day: u64,
    pub occurred_at: DateTime<Utc>,
}

/// A request to hold `quantity` units of a variant over `[starts_at, ends_at)`.
///
/// Never deleted: removal from a cart, cancellation and refunds are status
/// values. Mutated only by applying ledger facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    id: ReservationId,
    variant_id: VariantId,
    owner: Owner,
    quantity: i64,
    period: DateRange,
    price_per_day: u64,
    status: ReservationStatus,
    status_changed_at: DateTime<Utc>,
    distributed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    version: u64,
}

impl Reservation {
    /// A fresh, cart-owned, pending reservation.
    pub fn in_cart(cmd: &NewReservation) -> DomainResult<Self> {
        if cmd.quantity <= 0 {
            return Err(DomainError::InvalidQuantity(cmd.quantity));
        }
        Ok(Self {
            id: cmd.reservation_id,
            variant_id: cmd.variant_id,
            owner: Owner::Cart(cmd.cart_id),
            quantity: cmd.quantity,
            period: cmd.period,
            price_per_day: cmd.price_per_day,
            status: ReservationStatus::Pending,
            status_changed_at: cmd.occurred_at,
            distributed_at: None,
            created_at: cmd.occurred_at,
            version: 1,
        })
    }

    pub fn id_typed(&self) -> ReservationId {
        self.id
    }

    pub fn variant_id(&self) -> VariantId {
        self.variant_id
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn period(&self) -> DateRange {
        self.period
    }

    pub fn price_per_day(&self) -> u64 {
        self.price_per_day
    }

    pub fn status(&self) -> ReservationStatus {
        self.status
    }

    /// When the current status took effect.
    pub fn status_changed_at(&self) -> DateTime<Utc> {
        self.status_changed_at
    }

    pub fn distributed_at(&self) -> Option<DateTime<Utc>> {
        self.distributed_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Price of the whole line: per-day snapshot × quantity × billable days.
    pub fn line_total(&self) -> u64 {
        let days = u64::try_from(self.period.billable_days()).unwrap_or(0);
        let quantity = u64::try_from(self.quantity).unwrap_or(0);
        self.price_per_day.saturating_mul(quantity).saturating_mul(days)
    }

    /// A pending line still sitting in a cart.
    pub fn is_open_cart_line(&self) -> bool {
        matches!(self.owner, Owner::Cart(_)) && self.status == ReservationStatus::Pending
    }

    /// Evolve state from a ledger fact. Facts about other records are ignored.
    pub fn apply(&mut self, event: &LedgerEvent) {
        match event {
            LedgerEvent::ReservationStatusChanged(e) if e.reservation_id == self.id => {
                self.status = e.to;
                self.status_changed_at = e.occurred_at;
                if e.to == ReservationStatus::Distributed {
                    self.distributed_at = Some(e.occurred_at);
                }
            }
            LedgerEvent::OrderPlaced(e) if e.order.line_ids().contains(&self.id) => {
                self.owner = Owner::Order(e.order.id_typed());
            }
            _ => return,
        }

        // Deterministic version tracking: +1 per applied fact.
        self.version += 1;
    }
}

impl AggregateRoot for Reservation {
    type Id = ReservationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
