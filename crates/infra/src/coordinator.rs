//! Checkout orchestration: re-validate a cart and promote it to an order.
//!
//! ```text
//! Checkout
//!   ↓
//! 1. Read the cart (version) and its open lines
//!   ↓
//! 2. Snapshot every touched variant: capacity, committed spans, commit version
//!   ↓
//! 3. Plan: every line must fit (all-or-nothing), price the order
//!   ↓
//! 4. Promote: the ledger re-checks cart + variant versions and records the
//!    order and the re-owned lines in one write
//!   ↓
//! 5. On a version conflict, retry from 1 with backoff (bounded)
//! ```
//!
//! Step 4 is what makes the check and the write indivisible: a promotion
//! planned against a snapshot that another checkout has since moved is
//! rejected by the ledger instead of being committed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use rentwise_core::{AggregateRoot, CartId, DateRange, DomainError, ExpectedVersion, OrderId};
use rentwise_rentals::{FailingLine, Order, Owner, PaymentMethod, Reservation, plan_checkout};

use crate::availability::AvailabilityCalculator;
use crate::catalog::Catalog;
use crate::ledger::{Promotion, ReservationLedger};
use crate::retry::{RetryError, RetryPolicy};

/// Request to turn a cart into an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub cart_id: CartId,
    pub payment_method: PaymentMethod,
    /// Id of the order to create; kept stable across retries.
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

impl Checkout {
    pub fn new(cart_id: CartId, payment_method: PaymentMethod) -> Self {
        Self {
            cart_id,
            payment_method,
            order_id: OrderId::new(),
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("cart has no open lines")]
    EmptyCart,

    /// Every line that does not fit, with what it asked for and what is free.
    #[error("{} line(s) exceed available stock", .0.len())]
    InsufficientStock(Vec<FailingLine>),

    /// Other checkouts kept committing the same stock; safe to try again later.
    #[error("checkout conflicted with concurrent writers {attempts} time(s); please try again")]
    ConcurrencyConflict { attempts: u32 },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl CheckoutError {
    fn is_retryable(&self) -> bool {
        matches!(self, CheckoutError::Domain(err) if err.is_retryable())
    }
}

impl From<crate::error::StoreError> for CheckoutError {
    fn from(value: crate::error::StoreError) -> Self {
        CheckoutError::Domain(value.into())
    }
}

/// The checkout orchestrator.
#[derive(Debug, Clone)]
pub struct CartReservationCoordinator<L, C> {
    ledger: L,
    availability: AvailabilityCalculator<L, C>,
    retry: RetryPolicy,
}

impl<L, C> CartReservationCoordinator<L, C>
where
    L: ReservationLedger + Clone,
    C: Catalog,
{
    pub fn new(ledger: L, catalog: C, retry: RetryPolicy) -> Self {
        Self {
            availability: AvailabilityCalculator::new(ledger.clone(), catalog),
            ledger,
            retry,
        }
    }

    pub fn availability(&self) -> &AvailabilityCalculator<L, C> {
        &self.availability
    }

    /// Promote every open line of the cart into a new order, or change nothing.
    pub fn checkout(&self, cmd: &Checkout) -> Result<Order, CheckoutError> {
        let span =
            tracing::info_span!("checkout", cart_id = %cmd.cart_id, order_id = %cmd.order_id);
        let _guard = span.enter();

        let result = self.retry.run(
            |attempt| {
                tracing::debug!(attempt, "checkout attempt");
                self.attempt(cmd)
            },
            CheckoutError::is_retryable,
        );

        match result {
            Ok(order) => {
                tracing::info!(
                    lines = order.line_ids().len(),
                    total = order.total(),
                    "cart promoted to order"
                );
                Ok(order)
            }
            Err(RetryError { last, attempts }) if last.is_retryable() => {
                tracing::warn!(
                    attempts,
                    error = %last,
                    "checkout gave up after repeated conflicts"
                );
                Err(CheckoutError::ConcurrencyConflict { attempts })
            }
            Err(RetryError { last, .. }) => {
                tracing::debug!(error = %last, "checkout rejected");
                Err(last)
            }
        }
    }

    fn attempt(&self, cmd: &Checkout) -> Result<Order, CheckoutError> {
        let cart = self
            .ledger
            .cart(cmd.cart_id)?
            .ok_or_else(|| DomainError::not_found(format!("cart {}", cmd.cart_id)))?;

        let lines: Vec<Reservation> = self
            .ledger
            .reservations_owned_by(Owner::Cart(cmd.cart_id))?
            .into_iter()
            .filter(Reservation::is_open_cart_line)
            .collect();
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        // One window per variant covering all of its lines.
        let mut windows = BTreeMap::new();
        for line in &lines {
            windows
                .entry(line.variant_id())
                .and_modify(|w: &mut DateRange| *w = w.hull(&line.period()))
                .or_insert_with(|| line.period());
        }

        let mut snapshots = BTreeMap::new();
        for (variant_id, window) in &windows {
            snapshots.insert(*variant_id, self.availability.snapshot(*variant_id, window)?);
        }

        let plan = plan_checkout(&lines, &snapshots).map_err(|failing| {
            for line in &failing {
                tracing::debug!(
                    reservation_id = %line.reservation_id,
                    variant_id = %line.variant_id,
                    requested = line.requested,
                    available = line.available,
                    "line does not fit"
                );
            }
            CheckoutError::InsufficientStock(failing)
        })?;

        let order = Order::place(
            cmd.order_id,
            &cart,
            cmd.payment_method,
            plan.line_ids,
            plan.total,
            cmd.occurred_at,
        );

        let promotion = Promotion {
            cart_id: cmd.cart_id,
            expected_cart_version: ExpectedVersion::Exact(cart.version()),
            expected_variant_versions: snapshots
                .iter()
                .map(|(variant_id, s)| (*variant_id, ExpectedVersion::Exact(s.version)))
                .collect(),
            order,
            occurred_at: cmd.occurred_at,
        };

        self.ledger.promote(promotion).map_err(|err| {
            tracing::warn!(error = %err, "promotion rejected");
            CheckoutError::from(err)
        })
    }
}
