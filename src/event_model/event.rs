use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Globally unique identifier assigned to an event when it is generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Allocates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Broker key used when publishing the event.
    pub fn as_key(&self) -> String {
        self.0.to_string()
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Tagged event flowing through the pipeline.
///
/// Wire shape is `{id, serial, processed}` on every topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub serial: u64,
    pub processed: bool,
}

impl Event {
    /// Creates an unprocessed event carrying `serial`.
    pub fn generated(serial: u64) -> Self {
        Self {
            id: EventId::new(),
            serial,
            processed: false,
        }
    }

    /// Returns the event with the processed flag raised.
    pub fn into_processed(mut self) -> Self {
        self.processed = true;
        self
    }

    /// Broker key for this event. Keyed by identifier, never by serial.
    pub fn key(&self) -> String {
        self.id.as_key()
    }
}
