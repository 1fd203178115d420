use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A fact as recorded in a log.
///
/// - `stream_id` / `stream_type` name the record the fact is about (a cart,
///   an order, a reservation).
/// - `sequence_number` is the fact's position in the whole log; it is
///   strictly increasing and never reused.
/// - `commit_id` is shared by every fact recorded in the same atomic write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    commit_id: Uuid,
    stream_id: Uuid,
    stream_type: String,
    sequence_number: u64,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        commit_id: Uuid,
        stream_id: Uuid,
        stream_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            commit_id,
            stream_id,
            stream_type: stream_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn commit_id(&self) -> Uuid {
        self.commit_id
    }

    pub fn stream_id(&self) -> Uuid {
        self.stream_id
    }

    pub fn stream_type(&self) -> &str {
        &self.stream_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }
}
