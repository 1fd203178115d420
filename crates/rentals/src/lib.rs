//! Rental reservation domain (pure).
//!
//! Business rules for holding units of a rentable variant over time,
//! implemented as deterministic domain logic (no IO, no locking, no storage).
//! The infrastructure crate decides where state lives and how writes are
//! serialised; everything it needs to *decide* is here.

pub mod availability;
pub mod catalog;
pub mod checkout;
pub mod facts;
pub mod lifecycle;
pub mod order;
pub mod reservation;
pub mod stock;

pub use availability::{CommittedSpan, peak_commitment, remaining_capacity};
pub use catalog::{InventoryPool, Variant, pooled_capacity};
pub use checkout::{CheckoutPlan, FailingLine, VariantSnapshot, plan_checkout};
pub use facts::{
    CartOpened, LedgerEvent, OrderPlaced, OrderStatusChanged, ReservationAppended,
    ReservationStatusChanged,
};
pub use lifecycle::{
    OrderEvent, OrderStatusStateMachine, OrderTransition, ReservationEvent, StatusChange,
};
pub use order::{Cart, Order, OrderStatus, PaymentMethod};
pub use reservation::{NewReservation, Owner, Reservation, ReservationStatus};
pub use stock::StockMutationApplier;
