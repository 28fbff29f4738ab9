//! Reduces an interleaved, possibly duplicated stream of processed events into
//! a certified ordering status.
//!
//! Every arrival is classified against the highest contiguous serial seen so
//! far. Events ahead of the boundary wait in a serial-ordered buffer and are
//! drained as soon as the gap below them closes. Nothing is ever fabricated: a
//! serial that never arrives pins the boundary below it forever.

use super::event::Event;
use crate::broker::Delivery;
use crate::consumer::{DeliveryHandler, WorkerContext};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Classification of a single arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// The event extended the contiguous prefix; `drained` buffered events
    /// were promoted behind it.
    Advanced { drained: usize },
    /// The event is ahead of the contiguous prefix and waits in the buffer.
    Buffered,
    /// The serial was already accounted for, contiguous or buffered.
    Duplicate,
}

/// Mutable reconciliation state. Only reachable through [`Verifier`].
#[derive(Debug, Default)]
struct VerifierState {
    last_contiguous_serial: u64,
    pending_out_of_order: BTreeMap<u64, Event>,
    duplicates: Vec<Event>,
    unprocessed_detected: bool,
}

impl VerifierState {
    fn observe(&mut self, event: Event) -> Arrival {
        if !event.processed {
            self.unprocessed_detected = true;
            info!(serial = event.serial, id = %event.id, "unprocessed event detected");
        }

        let next = self.last_contiguous_serial + 1;
        if event.serial == next {
            self.last_contiguous_serial = event.serial;
            let drained = self.drain_pending();
            if self.pending_out_of_order.is_empty() {
                info!(
                    serial = self.last_contiguous_serial,
                    unprocessed_detected = self.unprocessed_detected,
                    "all aligned up to serial"
                );
            }
            return Arrival::Advanced { drained };
        }

        if event.serial < next || self.pending_out_of_order.contains_key(&event.serial) {
            info!(serial = event.serial, id = %event.id, "duplicated");
            self.duplicates.push(event);
            return Arrival::Duplicate;
        }

        debug!(
            serial = event.serial,
            last_contiguous = self.last_contiguous_serial,
            "out of order"
        );
        self.pending_out_of_order.insert(event.serial, event);
        Arrival::Buffered
    }

    /// Promotes buffered events while the smallest one closes the gap.
    fn drain_pending(&mut self) -> usize {
        let mut drained = 0;
        while let Some(entry) = self.pending_out_of_order.first_entry() {
            if *entry.key() != self.last_contiguous_serial + 1 {
                break;
            }
            let (serial, _) = entry.remove_entry();
            self.last_contiguous_serial = serial;
            drained += 1;
        }
        drained
    }

    fn status(&self) -> VerifierStatus {
        VerifierStatus {
            unprocessed_detected: self.unprocessed_detected,
            last_contiguous_serial: self.last_contiguous_serial,
            pending_out_of_order: self.pending_out_of_order.len(),
            duplicates: self.duplicates.clone(),
        }
    }
}

/// Immutable snapshot returned by [`Verifier::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifierStatus {
    pub unprocessed_detected: bool,
    pub last_contiguous_serial: u64,
    pub pending_out_of_order: usize,
    pub duplicates: Vec<Event>,
}

impl VerifierStatus {
    /// True once every serial in `1..=target` arrived and nothing is pending.
    pub fn is_complete(&self, target: u64) -> bool {
        self.last_contiguous_serial >= target && self.pending_out_of_order == 0
    }
}

/// Single logical reducer shared by every delivery worker.
///
/// Each arrival runs inside one critical section, because the drain loop reads
/// and writes several fields that must move together.
#[derive(Debug, Default)]
pub struct Verifier {
    state: Mutex<VerifierState>,
}

impl Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies one arrival and updates the reconciliation state.
    pub fn observe(&self, event: Event) -> Arrival {
        self.state.lock().observe(event)
    }

    /// Returns a detached copy of the current state.
    pub fn status(&self) -> VerifierStatus {
        self.state.lock().status()
    }

    /// Clears all state. Arrivals after this call see the initial state.
    pub fn reset(&self) {
        *self.state.lock() = VerifierState::default();
        info!("verifier reset");
    }
}

#[async_trait]
impl DeliveryHandler<Event> for Verifier {
    async fn handle(&self, ctx: &WorkerContext, delivery: &Delivery<Event>) -> anyhow::Result<()> {
        debug!(
            worker = %ctx,
            partition = delivery.partition,
            offset = delivery.offset,
            key = %delivery.key,
            serial = delivery.message.serial,
            "received processed upload"
        );
        self.observe(delivery.message.clone());
        Ok(())
    }
}
