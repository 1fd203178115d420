//! Durable record of every reservation, cart and order.
//!
//! The ledger is append-only: status changes, re-ownership at checkout and
//! order transitions are recorded as new facts, never as edits or deletes.
//! It is the only place engine state lives.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryLedger;
pub use r#trait::{Promotion, ReservationLedger};
