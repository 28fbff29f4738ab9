use super::event::{Event, EventId};
use crate::broker::Delivery;
use crate::consumer::{DeliveryHandler, WorkerContext};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Unique versus duplicated id counts over processed events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TallySummary {
    pub unique: u64,
    pub duplicated: u64,
}

/// Per-key count aggregate: how many times each processed id was seen.
///
/// Unlike [`crate::Verifier`] this ignores serial order entirely and only
/// answers whether any id reached the downstream topic more than once.
#[derive(Debug, Default)]
pub struct KeyTally {
    counts: Mutex<HashMap<EventId, u64>>,
}

impl KeyTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a processed event. Unprocessed events are filtered out.
    pub fn observe(&self, event: &Event) -> Option<u64> {
        if !event.processed {
            return None;
        }
        let mut counts = self.counts.lock();
        let count = counts.entry(event.id).or_insert(0);
        *count += 1;
        Some(*count)
    }

    pub fn summary(&self) -> TallySummary {
        let counts = self.counts.lock();
        counts
            .values()
            .fold(TallySummary::default(), |mut summary, count| {
                if *count == 1 {
                    summary.unique += 1;
                } else {
                    summary.duplicated += 1;
                }
                summary
            })
    }

    pub fn reset(&self) {
        self.counts.lock().clear();
    }
}

#[async_trait]
impl DeliveryHandler<Event> for KeyTally {
    async fn handle(&self, _ctx: &WorkerContext, delivery: &Delivery<Event>) -> anyhow::Result<()> {
        if let Some(count) = self.observe(&delivery.message) {
            if count > 1 {
                debug!(id = %delivery.message.id, count, "id seen again");
            }
        }
        Ok(())
    }
}
