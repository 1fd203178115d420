use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentwise_core::{AggregateRoot, CartId, CustomerId, OrderId, ReservationId};

use crate::facts::LedgerEvent;

/// Order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    Refunded,
    Failed,
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    BankTransfer,
    PayOnPickup,
}

/// A customer's mutable grouping of reservations before checkout.
///
/// The lines themselves live in the ledger (owner = this cart); the cart only
/// tracks identity and a version that moves whenever one of its lines does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    id: CartId,
    customer_id: CustomerId,
    opened_at: DateTime<Utc>,
    version: u64,
}

impl Cart {
    pub fn open(id: CartId, customer_id: CustomerId, opened_at: DateTime<Utc>) -> Self {
        Self {
            id,
            customer_id,
            opened_at,
            version: 1,
        }
    }

    pub fn id_typed(&self) -> CartId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Record a fact about one of this cart's lines.
    ///
    /// The caller routes only facts that concern this cart (a line appended
    /// to it, a line of it changing status, its lines leaving in an order).
    pub fn apply(&mut self, _event: &LedgerEvent) {
        self.version += 1;
    }
}

impl AggregateRoot for Cart {
    type Id = CartId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// An immutable grouping of reservations created exactly once from a cart.
///
/// Only `status` (and its timestamp) changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    customer_id: CustomerId,
    source_cart: CartId,
    payment_method: PaymentMethod,
    status: OrderStatus,
    status_changed_at: DateTime<Utc>,
    line_ids: Vec<ReservationId>,
    /// Sum of line totals in smallest currency unit.
    total: u64,
    created_at: DateTime<Utc>,
    version: u64,
}

impl Order {
    pub fn place(
        id: OrderId,
        cart: &Cart,
        payment_method: PaymentMethod,
        line_ids: Vec<ReservationId>,
        total: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            customer_id: cart.customer_id(),
            source_cart: cart.id_typed(),
            payment_method,
            status: OrderStatus::Pending,
            status_changed_at: created_at,
            line_ids,
            total,
            created_at,
            version: 1,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn source_cart(&self) -> CartId {
        self.source_cart
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn status_changed_at(&self) -> DateTime<Utc> {
        self.status_changed_at
    }

    pub fn line_ids(&self) -> &[ReservationId] {
        &self.line_ids
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn apply(&mut self, event: &LedgerEvent) {
        match event {
            LedgerEvent::OrderStatusChanged(e) if e.order_id == self.id => {
                self.status = e.to;
                self.status_changed_at = e.occurred_at;
            }
            _ => return,
        }

        self.version += 1;
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
