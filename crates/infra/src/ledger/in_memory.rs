use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use rentwise_core::{
    AggregateRoot, CartId, DateRange, ExpectedVersion, OrderId, ReservationId, VariantId,
};
use rentwise_events::{Event, EventEnvelope};
use rentwise_rentals::{
    Cart, CartOpened, CommittedSpan, LedgerEvent, Order, OrderPlaced, OrderStatusChanged,
    OrderTransition, Owner, Reservation, ReservationAppended, ReservationStatus,
    ReservationStatusChanged, StatusChange, StockMutationApplier,
};

use super::r#trait::{Promotion, ReservationLedger};
use crate::error::StoreError;

/// Current state derived from the fact log.
///
/// Only ever changed through [`LedgerState::apply`], so replaying the log into
/// an empty state reproduces it exactly.
#[derive(Debug, Default, Clone)]
struct LedgerState {
    carts: HashMap<CartId, Cart>,
    reservations: HashMap<ReservationId, Reservation>,
    orders: HashMap<OrderId, Order>,
    /// Carts that were promoted, with the order they became.
    checked_out: HashMap<CartId, OrderId>,
    by_owner: HashMap<Owner, Vec<ReservationId>>,
    start_index: HashMap<VariantId, StartIndex>,
    /// Bumped whenever new capacity is committed against a variant.
    variant_versions: HashMap<VariantId, u64>,
}

/// Order-owned reservations of one variant that still occupy capacity,
/// keyed by period start.
#[derive(Debug, Clone)]
struct StartIndex {
    starts: BTreeSet<(DateTime<Utc>, ReservationId)>,
    /// Longest period ever indexed; nothing starting earlier than
    /// `window.start - longest` can reach the window.
    longest: Duration,
}

impl Default for StartIndex {
    fn default() -> Self {
        Self {
            starts: BTreeSet::new(),
            longest: Duration::zero(),
        }
    }
}

impl StartIndex {
    fn insert(&mut self, period: &DateRange, id: ReservationId) {
        self.longest = self.longest.max(period.duration());
        self.starts.insert((period.start(), id));
    }

    fn remove(&mut self, period: &DateRange, id: ReservationId) {
        self.starts.remove(&(period.start(), id));
    }

    /// Ids whose period can overlap `window`: `start < window.end` and
    /// `start >= window.start - longest`.
    fn candidates(&self, window: &DateRange) -> impl Iterator<Item = &ReservationId> {
        let nil = ReservationId::from_uuid(Uuid::nil());
        let from = window
            .start()
            .checked_sub_signed(self.longest)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.starts
            .range((Bound::Included((from, nil)), Bound::Excluded((window.end(), nil))))
            .map(|(_, id)| id)
    }
}

impl LedgerState {
    fn apply(&mut self, event: &LedgerEvent) {
        match event {
            LedgerEvent::CartOpened(e) => {
                self.carts
                    .insert(e.cart_id, Cart::open(e.cart_id, e.customer_id, e.occurred_at));
            }
            LedgerEvent::ReservationAppended(e) => {
                let reservation = e.reservation.clone();
                let owner = reservation.owner();
                if let Owner::Cart(cart_id) = owner {
                    if let Some(cart) = self.carts.get_mut(&cart_id) {
                        cart.apply(event);
                    }
                }
                self.by_owner.entry(owner).or_default().push(reservation.id_typed());
                self.reservations.insert(reservation.id_typed(), reservation);
            }
            LedgerEvent::ReservationStatusChanged(e) => {
                if let Some(reservation) = self.reservations.get_mut(&e.reservation_id) {
                    reservation.apply(event);
                    match reservation.owner() {
                        Owner::Cart(cart_id) => {
                            if let Some(cart) = self.carts.get_mut(&cart_id) {
                                cart.apply(event);
                            }
                        }
                        Owner::Order(_) => {
                            // Released rows can never occupy capacity again.
                            if StockMutationApplier::effective_interval(reservation).is_none() {
                                if let Some(index) =
                                    self.start_index.get_mut(&reservation.variant_id())
                                {
                                    index.remove(&reservation.period(), reservation.id_typed());
                                }
                            }
                        }
                    }
                }
            }
            LedgerEvent::OrderPlaced(e) => {
                let order_id = e.order.id_typed();
                let cart_id = e.order.source_cart();
                let mut touched = BTreeSet::new();

                for line_id in e.order.line_ids() {
                    let Some(reservation) = self.reservations.get_mut(line_id) else {
                        continue;
                    };
                    reservation.apply(event);
                    touched.insert(reservation.variant_id());
                    self.start_index
                        .entry(reservation.variant_id())
                        .or_default()
                        .insert(&reservation.period(), *line_id);
                }

                if let Some(lines) = self.by_owner.get_mut(&Owner::Cart(cart_id)) {
                    lines.retain(|id| !e.order.line_ids().contains(id));
                }
                self.by_owner
                    .entry(Owner::Order(order_id))
                    .or_default()
                    .extend_from_slice(e.order.line_ids());

                for variant_id in touched {
                    *self.variant_versions.entry(variant_id).or_default() += 1;
                }
                if let Some(cart) = self.carts.get_mut(&cart_id) {
                    cart.apply(event);
                }
                self.checked_out.insert(cart_id, order_id);
                self.orders.insert(order_id, e.order.clone());
            }
            LedgerEvent::OrderStatusChanged(e) => {
                if let Some(order) = self.orders.get_mut(&e.order_id) {
                    order.apply(event);
                }
            }
        }
    }

    fn variant_version(&self, variant_id: VariantId) -> u64 {
        self.variant_versions.get(&variant_id).copied().unwrap_or(0)
    }

    fn committed_spans(&self, variant_id: VariantId, window: &DateRange) -> Vec<CommittedSpan> {
        let Some(index) = self.start_index.get(&variant_id) else {
            return Vec::new();
        };

        index
            .candidates(window)
            .filter_map(|id| self.reservations.get(id))
            .filter_map(StockMutationApplier::committed_span)
            .filter(|span| span.interval.overlaps(window))
            .collect()
    }

    fn reservation(&self, id: ReservationId) -> Result<&Reservation, StoreError> {
        self.reservations
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(format!("reservation {id}")))
    }

    /// Validate a line status change against current state.
    fn check_status_change(&self, change: &StatusChange) -> Result<(), StoreError> {
        let id = change.reservation_id;
        let current = self.reservation(id)?;
        if current.owner() != change.owner {
            return Err(StoreError::OwnerConflict(format!(
                "reservation {id} is owned by {:?}, not {:?}",
                current.owner(),
                change.owner
            )));
        }
        ExpectedVersion::Exact(change.expected_version)
            .check(current.version())
            .map_err(|e| StoreError::Concurrency(format!("reservation {id}: {e}")))?;
        if current.status() != change.from {
            return Err(StoreError::Invalid(format!(
                "reservation {} is {}, not {}",
                change.reservation_id,
                current.status(),
                change.from
            )));
        }
        if change.occurred_at < current.status_changed_at() {
            return Err(StoreError::Invalid(format!(
                "reservation {} cannot change status before {}",
                change.reservation_id,
                current.status_changed_at()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: LedgerState,
    log: Vec<EventEnvelope<LedgerEvent>>,
}

impl Inner {
    /// Record facts as one commit and fold them into state. Callers validate first.
    fn record(&mut self, facts: Vec<(Uuid, &'static str, LedgerEvent)>) {
        let commit_id = Uuid::now_v7();
        for (stream_id, stream_type, fact) in facts {
            let sequence_number = self.log.len() as u64 + 1;
            tracing::trace!(
                sequence_number,
                stream_id = %stream_id,
                event_type = fact.event_type(),
                "ledger fact recorded"
            );
            self.state.apply(&fact);
            self.log.push(EventEnvelope::new(
                Uuid::now_v7(),
                commit_id,
                stream_id,
                stream_type,
                sequence_number,
                fact,
            ));
        }
    }
}

const CART_STREAM: &str = "rental.cart";
const RESERVATION_STREAM: &str = "rental.reservation";
const ORDER_STREAM: &str = "rental.order";

/// In-memory, append-only reservation ledger.
///
/// A single `RwLock` serialises writers; every write validates and records
/// its facts inside one critical section. Readers see a consistent state.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    inner: RwLock<Inner>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from previously recorded facts.
    pub fn replay(facts: impl IntoIterator<Item = EventEnvelope<LedgerEvent>>) -> Self {
        let mut inner = Inner::default();
        for envelope in facts {
            inner.state.apply(envelope.payload());
            inner.log.push(envelope);
        }
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// A copy of the ledger as it stood after fact `sequence_number`.
    ///
    /// A cut inside a multi-fact write is moved to the end of that write, so
    /// the copy never shows half of an order transition.
    pub fn as_of(&self, sequence_number: u64) -> Result<InMemoryLedger, StoreError> {
        let inner = self.read()?;
        let mut cut = inner
            .log
            .partition_point(|env| env.sequence_number() <= sequence_number);
        if let Some(last) = cut.checked_sub(1).and_then(|i| inner.log.get(i)) {
            let commit_id = last.commit_id();
            cut += inner.log[cut..]
                .iter()
                .take_while(|env| env.commit_id() == commit_id)
                .count();
        }
        Ok(Self::replay(inner.log[..cut].iter().cloned()))
    }

    /// Every recorded fact, oldest first.
    pub fn facts(&self) -> Result<Vec<EventEnvelope<LedgerEvent>>, StoreError> {
        Ok(self.read()?.log.clone())
    }

    /// Sequence number of the latest fact (0 when empty).
    pub fn head(&self) -> Result<u64, StoreError> {
        Ok(self.read()?.log.len() as u64)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner.read().map_err(|_| StoreError::Poisoned("reservation ledger"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner.write().map_err(|_| StoreError::Poisoned("reservation ledger"))
    }
}

fn touches(event: &LedgerEvent, stream_id: Uuid) -> bool {
    match event {
        LedgerEvent::CartOpened(e) => *e.cart_id.as_uuid() == stream_id,
        LedgerEvent::ReservationAppended(e) => {
            *e.reservation.id_typed().as_uuid() == stream_id
                || e.reservation.owner().cart().is_some_and(|c| *c.as_uuid() == stream_id)
        }
        LedgerEvent::ReservationStatusChanged(e) => *e.reservation_id.as_uuid() == stream_id,
        LedgerEvent::OrderPlaced(e) => {
            *e.order.id_typed().as_uuid() == stream_id
                || *e.order.source_cart().as_uuid() == stream_id
                || e.order.line_ids().iter().any(|id| *id.as_uuid() == stream_id)
        }
        LedgerEvent::OrderStatusChanged(e) => *e.order_id.as_uuid() == stream_id,
    }
}

impl ReservationLedger for InMemoryLedger {
    fn open_cart(&self, cart: Cart) -> Result<Cart, StoreError> {
        let mut inner = self.write()?;
        let cart_id = cart.id_typed();
        if inner.state.carts.contains_key(&cart_id) {
            return Err(StoreError::Invalid(format!("cart {cart_id} already exists")));
        }

        inner.record(vec![(
            *cart_id.as_uuid(),
            CART_STREAM,
            LedgerEvent::CartOpened(CartOpened {
                cart_id,
                customer_id: cart.customer_id(),
                occurred_at: cart.opened_at(),
            }),
        )]);

        inner
            .state
            .carts
            .get(&cart_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("cart {cart_id}")))
    }

    fn cart(&self, cart_id: CartId) -> Result<Option<Cart>, StoreError> {
        Ok(self.read()?.state.carts.get(&cart_id).cloned())
    }

    fn append(&self, reservation: Reservation) -> Result<Reservation, StoreError> {
        let mut inner = self.write()?;
        let id = reservation.id_typed();

        let cart_id = match reservation.owner() {
            Owner::Cart(cart_id) => cart_id,
            Owner::Order(order_id) => {
                return Err(StoreError::OwnerConflict(format!(
                    "order {order_id} is immutable; reservation {id} must be added to a cart"
                )));
            }
        };
        if !inner.state.carts.contains_key(&cart_id) {
            return Err(StoreError::OwnerConflict(format!("cart {cart_id} does not exist")));
        }
        if let Some(order_id) = inner.state.checked_out.get(&cart_id) {
            return Err(StoreError::OwnerConflict(format!(
                "cart {cart_id} was already checked out as order {order_id}"
            )));
        }
        if inner.state.reservations.contains_key(&id) {
            return Err(StoreError::Invalid(format!("reservation {id} already exists")));
        }

        let occurred_at = reservation.created_at();
        inner.record(vec![(
            *id.as_uuid(),
            RESERVATION_STREAM,
            LedgerEvent::ReservationAppended(ReservationAppended {
                reservation,
                occurred_at,
            }),
        )]);

        inner.state.reservation(id).cloned()
    }

    fn set_status(&self, change: StatusChange) -> Result<Reservation, StoreError> {
        let mut inner = self.write()?;
        inner.state.check_status_change(&change)?;

        let id = change.reservation_id;
        inner.record(vec![(
            *id.as_uuid(),
            RESERVATION_STREAM,
            LedgerEvent::ReservationStatusChanged(ReservationStatusChanged {
                reservation_id: id,
                from: change.from,
                to: change.to,
                occurred_at: change.occurred_at,
            }),
        )]);

        inner.state.reservation(id).cloned()
    }

    fn active_overlapping(
        &self,
        variant_id: VariantId,
        window: &DateRange,
    ) -> Result<Vec<CommittedSpan>, StoreError> {
        Ok(self.read()?.state.committed_spans(variant_id, window))
    }

    fn committed_snapshot(
        &self,
        variant_id: VariantId,
        window: &DateRange,
    ) -> Result<(u64, Vec<CommittedSpan>), StoreError> {
        let inner = self.read()?;
        Ok((
            inner.state.variant_version(variant_id),
            inner.state.committed_spans(variant_id, window),
        ))
    }

    fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        Ok(self.read()?.state.reservations.get(&id).cloned())
    }

    fn reservations_owned_by(&self, owner: Owner) -> Result<Vec<Reservation>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .state
            .by_owner
            .get(&owner)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.state.reservations.get(id).cloned())
            .collect())
    }

    fn promote(&self, promotion: Promotion) -> Result<Order, StoreError> {
        let mut inner = self.write()?;
        let state = &inner.state;
        let Promotion {
            cart_id,
            expected_cart_version,
            expected_variant_versions,
            order,
            occurred_at,
        } = promotion;
        let order_id = order.id_typed();

        let cart = state
            .carts
            .get(&cart_id)
            .ok_or_else(|| StoreError::NotFound(format!("cart {cart_id}")))?;
        if order.source_cart() != cart_id {
            return Err(StoreError::Invalid(format!(
                "order {order_id} was not placed from cart {cart_id}"
            )));
        }
        if state.orders.contains_key(&order_id) {
            return Err(StoreError::Invalid(format!("order {order_id} already exists")));
        }
        if let Some(existing) = state.checked_out.get(&cart_id) {
            return Err(StoreError::OwnerConflict(format!(
                "cart {cart_id} was already checked out as order {existing}"
            )));
        }
        expected_cart_version
            .check(cart.version())
            .map_err(|e| StoreError::Concurrency(format!("cart {cart_id}: {e}")))?;

        let mut variants = BTreeSet::new();
        for line_id in order.line_ids() {
            let line = state.reservation(*line_id)?;
            if line.owner() != Owner::Cart(cart_id) || line.status() != ReservationStatus::Pending {
                return Err(StoreError::OwnerConflict(format!(
                    "reservation {line_id} is not an open line of cart {cart_id}"
                )));
            }
            variants.insert(line.variant_id());
        }

        for variant_id in &variants {
            let expected = expected_variant_versions.get(variant_id).ok_or_else(|| {
                StoreError::Invalid(format!("no version expectation for variant {variant_id}"))
            })?;
            expected
                .check(state.variant_version(*variant_id))
                .map_err(|e| StoreError::Concurrency(format!("variant {variant_id}: {e}")))?;
        }

        inner.record(vec![(
            *order_id.as_uuid(),
            ORDER_STREAM,
            LedgerEvent::OrderPlaced(OrderPlaced { order, occurred_at }),
        )]);

        inner
            .state
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("order {order_id}")))
    }

    fn order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.read()?.state.orders.get(&order_id).cloned())
    }

    fn apply_order_transition(&self, transition: OrderTransition) -> Result<Order, StoreError> {
        let mut inner = self.write()?;
        let order_id = transition.order_id;

        let order = inner
            .state
            .orders
            .get(&order_id)
            .ok_or_else(|| StoreError::NotFound(format!("order {order_id}")))?;
        ExpectedVersion::Exact(transition.expected_version)
            .check(order.version())
            .map_err(|e| StoreError::Concurrency(format!("order {order_id}: {e}")))?;
        if order.status() != transition.from {
            return Err(StoreError::Invalid(format!(
                "order {order_id} is {}, not {}",
                order.status(),
                transition.from
            )));
        }
        for change in &transition.line_changes {
            if change.owner != Owner::Order(order_id) {
                return Err(StoreError::OwnerConflict(format!(
                    "reservation {} does not belong to order {order_id}",
                    change.reservation_id
                )));
            }
            inner.state.check_status_change(change)?;
        }

        let mut facts = vec![(
            *order_id.as_uuid(),
            ORDER_STREAM,
            LedgerEvent::OrderStatusChanged(OrderStatusChanged {
                order_id,
                from: transition.from,
                to: transition.to,
                occurred_at: transition.occurred_at,
            }),
        )];
        facts.extend(transition.line_changes.into_iter().map(|change| {
            (
                *change.reservation_id.as_uuid(),
                RESERVATION_STREAM,
                LedgerEvent::ReservationStatusChanged(ReservationStatusChanged {
                    reservation_id: change.reservation_id,
                    from: change.from,
                    to: change.to,
                    occurred_at: change.occurred_at,
                }),
            )
        }));
        inner.record(facts);

        inner
            .state
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("order {order_id}")))
    }

    fn history(&self, stream_id: Uuid) -> Result<Vec<EventEnvelope<LedgerEvent>>, StoreError> {
        Ok(self
            .read()?
            .log
            .iter()
            .filter(|env| env.stream_id() == stream_id || touches(env.payload(), stream_id))
            .cloned()
            .collect())
    }
}
