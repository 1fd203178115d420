//! Facts and their transport.
//!
//! - [`Event`]: an immutable, versioned, append-only fact.
//! - [`EventEnvelope`]: a fact plus its stream and position in the log.
//! - [`EventBus`]: pub/sub mechanics used to deliver external inputs (payment
//!   outcomes) into the engine.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
