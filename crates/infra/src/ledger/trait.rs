use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use rentwise_core::{CartId, DateRange, ExpectedVersion, OrderId, ReservationId, VariantId};
use rentwise_events::EventEnvelope;
use rentwise_rentals::{
    Cart, CommittedSpan, LedgerEvent, Order, OrderTransition, Owner, Reservation, StatusChange,
};

use crate::error::StoreError;

/// Everything needed to turn a cart into an order in one atomic write.
///
/// The ledger commits the promotion only if the cart and every listed variant
/// are still at the versions the availability check was made against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promotion {
    pub cart_id: CartId,
    pub expected_cart_version: ExpectedVersion,
    /// One entry per variant touched by the cart.
    pub expected_variant_versions: BTreeMap<VariantId, ExpectedVersion>,
    /// The order to create; its `line_ids` are the lines to re-own.
    pub order: Order,
    pub occurred_at: DateTime<Utc>,
}

/// Append-only reservation ledger.
///
/// ## Concurrency contract
///
/// - Every write is atomic: either all of its facts are recorded or none.
/// - [`ReservationLedger::promote`] is the only write that commits capacity.
///   It validates the per-variant commit versions and the cart version under
///   the same critical section that records the facts, so a check made
///   against an older snapshot can never be committed.
/// - Status writes carry the row's expected version (single-row lock); they
///   only ever release capacity and do not move variant versions.
/// - Reads may be served from a slightly stale view; they are advisory.
pub trait ReservationLedger: Send + Sync {
    fn open_cart(&self, cart: Cart) -> Result<Cart, StoreError>;

    fn cart(&self, cart_id: CartId) -> Result<Option<Cart>, StoreError>;

    /// Record a new cart-owned reservation.
    ///
    /// Fails with `OwnerConflict` if the owner is an order (orders are
    /// immutable once created) or the cart does not exist.
    fn append(&self, reservation: Reservation) -> Result<Reservation, StoreError>;

    /// Record a status transition with the time it took effect.
    fn set_status(&self, change: StatusChange) -> Result<Reservation, StoreError>;

    /// Order-owned reservations whose effective interval overlaps `window`.
    fn active_overlapping(
        &self,
        variant_id: VariantId,
        window: &DateRange,
    ) -> Result<Vec<CommittedSpan>, StoreError>;

    /// `active_overlapping` together with the variant's commit version, read atomically.
    fn committed_snapshot(
        &self,
        variant_id: VariantId,
        window: &DateRange,
    ) -> Result<(u64, Vec<CommittedSpan>), StoreError>;

    fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError>;

    fn reservations_owned_by(&self, owner: Owner) -> Result<Vec<Reservation>, StoreError>;

    /// Create the order and re-own every line from the cart to it.
    fn promote(&self, promotion: Promotion) -> Result<Order, StoreError>;

    fn order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Record an order status change and its cascaded line changes atomically.
    fn apply_order_transition(&self, transition: OrderTransition) -> Result<Order, StoreError>;

    /// All facts recorded for one cart, order or reservation, oldest first.
    fn history(&self, stream_id: Uuid) -> Result<Vec<EventEnvelope<LedgerEvent>>, StoreError>;
}

impl<S> ReservationLedger for Arc<S>
where
    S: ReservationLedger + ?Sized,
{
    fn open_cart(&self, cart: Cart) -> Result<Cart, StoreError> {
        (**self).open_cart(cart)
    }

    fn cart(&self, cart_id: CartId) -> Result<Option<Cart>, StoreError> {
        (**self).cart(cart_id)
    }

    fn append(&self, reservation: Reservation) -> Result<Reservation, StoreError> {
        (**self).append(reservation)
    }

    fn set_status(&self, change: StatusChange) -> Result<Reservation, StoreError> {
        (**self).set_status(change)
    }

    fn active_overlapping(
        &self,
        variant_id: VariantId,
        window: &DateRange,
    ) -> Result<Vec<CommittedSpan>, StoreError> {
        (**self).active_overlapping(variant_id, window)
    }

    fn committed_snapshot(
        &self,
        variant_id: VariantId,
        window: &DateRange,
    ) -> Result<(u64, Vec<CommittedSpan>), StoreError> {
        (**self).committed_snapshot(variant_id, window)
    }

    fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        (**self).reservation(id)
    }

    fn reservations_owned_by(&self, owner: Owner) -> Result<Vec<Reservation>, StoreError> {
        (**self).reservations_owned_by(owner)
    }

    fn promote(&self, promotion: Promotion) -> Result<Order, StoreError> {
        (**self).promote(promotion)
    }

    fn order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        (**self).order(order_id)
    }

    fn apply_order_transition(&self, transition: OrderTransition) -> Result<Order, StoreError> {
        (**self).apply_order_transition(transition)
    }

    fn history(&self, stream_id: Uuid) -> Result<Vec<EventEnvelope<LedgerEvent>>, StoreError> {
        (**self).history(stream_id)
    }
}
