//! The reservation engine facade used by the surrounding API layer.
//!
//! Wires the ledger, the catalog, availability, checkout and the status
//! state machine together. All state lives in the ledger and the catalog; the
//! engine itself only holds handles to them and its configuration.

use std::io;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use rentwise_core::{
    CartId, CustomerId, DateRange, DomainError, DomainResult, OrderId, ReservationId, VariantId,
};
use rentwise_events::{EventBus, EventEnvelope};
use rentwise_rentals::{
    Cart, CommittedSpan, InventoryPool, LedgerEvent, NewReservation, Order, OrderEvent,
    OrderStatus, OrderStatusStateMachine, Owner, Reservation, ReservationEvent, Variant,
    remaining_capacity,
};

use crate::catalog::{Catalog, InMemoryCatalog};
use crate::config::EngineConfig;
use crate::coordinator::{CartReservationCoordinator, Checkout, CheckoutError};
use crate::ledger::{InMemoryLedger, ReservationLedger};
use crate::payments::{PaymentEvent, PaymentEventWorker, WorkerHandle};

/// Add `quantity` units of a variant over `period` to a cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddToCart {
    pub cart_id: CartId,
    pub variant_id: VariantId,
    pub quantity: i64,
    pub period: DateRange,
    pub reservation_id: ReservationId,
    pub occurred_at: DateTime<Utc>,
}

impl AddToCart {
    pub fn new(cart_id: CartId, variant_id: VariantId, quantity: i64, period: DateRange) -> Self {
        Self {
            cart_id,
            variant_id,
            quantity,
            period,
            reservation_id: ReservationId::new(),
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub struct ReservationEngine<L = Arc<InMemoryLedger>, C = Arc<InMemoryCatalog>> {
    ledger: L,
    catalog: C,
    coordinator: CartReservationCoordinator<L, C>,
    config: EngineConfig,
}

impl ReservationEngine {
    /// Engine over a fresh in-memory ledger and catalog.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(Arc::new(InMemoryLedger::new()), Arc::new(InMemoryCatalog::new()), config)
    }
}

impl<L, C> ReservationEngine<L, C>
where
    L: ReservationLedger + Clone,
    C: Catalog + Clone,
{
    pub fn new(ledger: L, catalog: C, config: EngineConfig) -> Self {
        Self {
            coordinator: CartReservationCoordinator::new(
                ledger.clone(),
                catalog.clone(),
                config.retry.clone(),
            ),
            ledger,
            catalog,
            config,
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn register_variant(&self, variant: Variant) -> DomainResult<()> {
        variant.validate()?;
        self.catalog.upsert_variant(variant)?;
        Ok(())
    }

    /// Create or resize the pool of a variant at one location.
    pub fn set_pool(&self, pool: InventoryPool) -> DomainResult<()> {
        tracing::info!(
            variant_id = %pool.variant_id,
            capacity = pool.capacity,
            "inventory pool updated"
        );
        self.catalog.set_pool(pool)?;
        Ok(())
    }

    pub fn open_cart(&self, customer_id: CustomerId) -> DomainResult<Cart> {
        Ok(self.ledger.open_cart(Cart::open(CartId::new(), customer_id, Utc::now()))?)
    }

    /// Record a soft hold in the cart.
    ///
    /// Nothing is committed yet, but a request that cannot fit right now (given
    /// committed stock and this cart's other lines) is rejected early.
    pub fn add_to_cart(&self, cmd: &AddToCart) -> DomainResult<Reservation> {
        if cmd.quantity <= 0 {
            return Err(DomainError::InvalidQuantity(cmd.quantity));
        }
        let variant = self
            .catalog
            .variant(cmd.variant_id)?
            .ok_or_else(|| DomainError::not_found(format!("variant {}", cmd.variant_id)))?;
        if self.ledger.cart(cmd.cart_id)?.is_none() {
            return Err(DomainError::not_found(format!("cart {}", cmd.cart_id)));
        }

        let mut spans = self.ledger.active_overlapping(cmd.variant_id, &cmd.period)?;
        spans.extend(
            self.cart_lines(cmd.cart_id)?
                .into_iter()
                .filter(|l| l.variant_id() == cmd.variant_id && l.period().overlaps(&cmd.period))
                .map(|l| CommittedSpan {
                    reservation_id: l.id_typed(),
                    quantity: l.quantity(),
                    interval: l.period(),
                }),
        );
        let capacity = self.catalog.capacity(cmd.variant_id)?;
        let available = remaining_capacity(capacity, &spans, &cmd.period);
        if cmd.quantity > available {
            return Err(DomainError::InsufficientStock {
                variant_id: cmd.variant_id,
                requested: cmd.quantity,
                available,
            });
        }

        let reservation = Reservation::in_cart(&NewReservation {
            reservation_id: cmd.reservation_id,
            cart_id: cmd.cart_id,
            variant_id: cmd.variant_id,
            quantity: cmd.quantity,
            period: cmd.period,
            price_per_day: variant.price_per_day,
            occurred_at: cmd.occurred_at,
        })?;
        Ok(self.ledger.append(reservation)?)
    }

    /// Take a line out of a cart. The line stays in the ledger as `cancelled`.
    ///
    /// Fails with `OwnerConflict` if the line is not (or no longer) in the cart,
    /// e.g. because the cart was checked out concurrently.
    pub fn remove_from_cart(
        &self,
        cart_id: CartId,
        reservation_id: ReservationId,
    ) -> DomainResult<Reservation> {
        self.transition_line(
            reservation_id,
            Some(Owner::Cart(cart_id)),
            ReservationEvent::Cancel,
            Utc::now(),
        )
    }

    /// Lines still pending in the cart.
    pub fn cart_lines(&self, cart_id: CartId) -> DomainResult<Vec<Reservation>> {
        Ok(self
            .ledger
            .reservations_owned_by(Owner::Cart(cart_id))?
            .into_iter()
            .filter(Reservation::is_open_cart_line)
            .collect())
    }

    /// Units free over the whole window (advisory).
    pub fn available(&self, variant_id: VariantId, window: &DateRange) -> DomainResult<i64> {
        self.coordinator.availability().available(variant_id, window)
    }

    pub fn checkout(&self, cmd: &Checkout) -> Result<Order, CheckoutError> {
        self.coordinator.checkout(cmd)
    }

    pub fn transition_reservation(
        &self,
        reservation_id: ReservationId,
        event: ReservationEvent,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Reservation> {
        self.transition_line(reservation_id, None, event, occurred_at)
    }

    /// The ledger re-checks `change.owner`, so a line that changes hands
    /// between the read and the write is refused rather than transitioned.
    fn transition_line(
        &self,
        reservation_id: ReservationId,
        expected_owner: Option<Owner>,
        event: ReservationEvent,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Reservation> {
        self.config
            .retry
            .run(
                |_| -> DomainResult<Reservation> {
                    let line = self.reservation(reservation_id)?;
                    if expected_owner.is_some_and(|owner| owner != line.owner()) {
                        return Err(DomainError::owner_conflict(format!(
                            "reservation {reservation_id} is owned by {:?}",
                            line.owner()
                        )));
                    }
                    let parent = match line.owner() {
                        Owner::Order(order_id) => self.ledger.order(order_id)?,
                        Owner::Cart(_) => None,
                    };
                    let change = OrderStatusStateMachine::reservation_transition(
                        &line,
                        parent.as_ref(),
                        event,
                        occurred_at,
                    )?;
                    Ok(self.ledger.set_status(change)?)
                },
                DomainError::is_retryable,
            )
            .map_err(|err| {
                tracing::debug!(
                    reservation_id = %reservation_id,
                    event = %event,
                    error = %err.last,
                    "reservation transition rejected"
                );
                err.last
            })
    }

    pub fn transition_order(
        &self,
        order_id: OrderId,
        event: OrderEvent,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Order> {
        self.config
            .retry
            .run(
                |_| -> DomainResult<Order> {
                    let order = self.order(order_id)?;
                    let lines = self.ledger.reservations_owned_by(Owner::Order(order_id))?;
                    let transition = OrderStatusStateMachine::order_transition(
                        &order,
                        &lines,
                        event,
                        occurred_at,
                    )?;
                    Ok(self.ledger.apply_order_transition(transition)?)
                },
                DomainError::is_retryable,
            )
            .map_err(|err| {
                tracing::debug!(
                    order_id = %order_id,
                    event = %event,
                    error = %err.last,
                    "order transition rejected"
                );
                err.last
            })
    }

    /// Apply a payment outcome. Redelivery of an already applied outcome is a no-op.
    pub fn handle_payment(&self, event: &PaymentEvent) -> DomainResult<Order> {
        let order = self.order(event.order_id())?;
        let already = match event {
            PaymentEvent::Succeeded { .. } => order.status() == OrderStatus::Confirmed,
            PaymentEvent::Failed { .. } => order.status() == OrderStatus::Failed,
        };
        if already {
            tracing::debug!(order_id = %event.order_id(), "duplicate payment event ignored");
            return Ok(order);
        }
        if let PaymentEvent::Failed { reason, .. } = event {
            tracing::info!(order_id = %event.order_id(), reason = %reason, "payment failed");
        }
        self.transition_order(event.order_id(), event.order_event(), event.occurred_at())
    }

    pub fn order(&self, order_id: OrderId) -> DomainResult<Order> {
        self.ledger
            .order(order_id)?
            .ok_or_else(|| DomainError::not_found(format!("order {order_id}")))
    }

    pub fn reservation(&self, reservation_id: ReservationId) -> DomainResult<Reservation> {
        self.ledger
            .reservation(reservation_id)?
            .ok_or_else(|| DomainError::not_found(format!("reservation {reservation_id}")))
    }

    /// Lines of an order, in ledger order.
    pub fn order_lines(&self, order_id: OrderId) -> DomainResult<Vec<Reservation>> {
        Ok(self.ledger.reservations_owned_by(Owner::Order(order_id))?)
    }

    /// Audit trail of one cart, order or reservation.
    pub fn history(&self, stream_id: Uuid) -> DomainResult<Vec<EventEnvelope<LedgerEvent>>> {
        Ok(self.ledger.history(stream_id)?)
    }
}

impl<L, C> ReservationEngine<L, C>
where
    L: ReservationLedger + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    /// Start a worker that applies payment outcomes published on `bus`.
    pub fn spawn_payment_worker<B>(self: &Arc<Self>, bus: B) -> io::Result<WorkerHandle>
    where
        B: EventBus<PaymentEvent> + Send + Sync + 'static,
    {
        let engine = Arc::clone(self);
        PaymentEventWorker::spawn(bus, self.config.payment_worker_tick, move |event| {
            engine.handle_payment(&event).map(|_| ())
        })
    }
}
