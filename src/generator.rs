//! Rate-controlled emitter of serially numbered events.
//!
//! At most one run is active per generator. Each tick synthesizes the next
//! serial and publishes it fire-and-forget, keyed by the event id. A failed
//! publish is logged and becomes a permanent gap downstream.

use crate::broker::Broker;
use crate::event_model::Event;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shortest accepted inter-event period.
pub const MIN_RATE: Duration = Duration::from_millis(1);

/// Progress of the current or most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorStatus {
    pub running: bool,
    pub emitted: u64,
    pub target: u64,
}

#[derive(Debug)]
struct RunProgress {
    counter: AtomicU64,
    target: u64,
}

#[derive(Debug)]
struct ActiveRun {
    run_id: u64,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct GeneratorSlot {
    active: Option<ActiveRun>,
    latest: Option<Arc<RunProgress>>,
}

impl GeneratorSlot {
    fn is_current(&self, run_id: u64) -> bool {
        self.active
            .as_ref()
            .map(|run| run.run_id == run_id)
            .unwrap_or(false)
    }

    fn stop(&mut self) -> bool {
        match self.active.take() {
            Some(run) => {
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

/// Single-flight event generator.
pub struct Generator {
    broker: Arc<dyn Broker<Event>>,
    topic: Arc<str>,
    slot: Arc<Mutex<GeneratorSlot>>,
    runs: AtomicU64,
}

impl Generator {
    pub fn new(broker: Arc<dyn Broker<Event>>, topic: impl Into<Arc<str>>) -> Self {
        Self {
            broker,
            topic: topic.into(),
            slot: Arc::new(Mutex::new(GeneratorSlot::default())),
            runs: AtomicU64::new(0),
        }
    }

    /// Starts emitting `count` events, one every `rate`, starting immediately.
    ///
    /// Returns `false` without side effects when a run is already active.
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, rate: Duration, count: u64) -> bool {
        let mut slot = self.slot.lock();
        if slot.active.is_some() {
            info!("generator already running");
            return false;
        }
        let run_id = self.runs.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        let progress = Arc::new(RunProgress {
            counter: AtomicU64::new(0),
            target: count,
        });
        slot.active = Some(ActiveRun {
            run_id,
            cancel: cancel.clone(),
        });
        slot.latest = Some(Arc::clone(&progress));
        drop(slot);

        let period = rate.max(MIN_RATE);
        info!(run_id, rate_ms = period.as_millis() as u64, count, "generator started");
        tokio::spawn(run_generator(RunTask {
            broker: Arc::clone(&self.broker),
            topic: Arc::clone(&self.topic),
            slot: Arc::clone(&self.slot),
            run_id,
            period,
            cancel,
            progress,
        }));
        true
    }

    /// Cancels the active run. Safe to call when nothing is running.
    pub fn stop(&self) {
        if self.slot.lock().stop() {
            info!("generator done/stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.slot.lock().active.is_some()
    }

    pub fn status(&self) -> GeneratorStatus {
        let slot = self.slot.lock();
        let (emitted, target) = slot
            .latest
            .as_ref()
            .map(|progress| (progress.counter.load(Ordering::SeqCst), progress.target))
            .unwrap_or((0, 0));
        GeneratorStatus {
            running: slot.active.is_some(),
            emitted,
            target,
        }
    }

    /// Cancels any active run ahead of process exit.
    pub fn shutdown(&self) {
        self.stop();
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        self.slot.lock().stop();
    }
}

struct RunTask {
    broker: Arc<dyn Broker<Event>>,
    topic: Arc<str>,
    slot: Arc<Mutex<GeneratorSlot>>,
    run_id: u64,
    period: Duration,
    cancel: CancellationToken,
    progress: Arc<RunProgress>,
}

async fn run_generator(task: RunTask) {
    let mut ticker = interval(task.period);
    // Fixed-rate schedule: a stalled runtime catches up on missed ticks.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
    loop {
        if task.progress.counter.load(Ordering::SeqCst) >= task.progress.target {
            finish_run(&task);
            break;
        }
        tokio::select! {
            biased;
            _ = task.cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if !emit_next(&task) {
            break;
        }
    }
}

/// Emits the next serial under the slot lock, so that no tick fires once
/// `stop` has returned. Returns `false` when the run is no longer current.
fn emit_next(task: &RunTask) -> bool {
    let slot = task.slot.lock();
    if !slot.is_current(task.run_id) {
        return false;
    }
    let serial = task.progress.counter.fetch_add(1, Ordering::SeqCst) + 1;
    publish_detached(task, Event::generated(serial));
    true
}

fn finish_run(task: &RunTask) {
    let mut slot = task.slot.lock();
    if slot.is_current(task.run_id) && slot.stop() {
        info!(
            run_id = task.run_id,
            emitted = task.progress.counter.load(Ordering::SeqCst),
            "generator done/stopped"
        );
    }
}

fn publish_detached(task: &RunTask, event: Event) {
    let broker = Arc::clone(&task.broker);
    let topic = Arc::clone(&task.topic);
    tokio::spawn(async move {
        let key = event.key();
        let (id, serial) = (event.id, event.serial);
        match broker.publish(&topic, &key, event).await {
            Ok(receipt) => info!(
                %id,
                serial,
                partition = receipt.partition,
                offset = receipt.offset,
                "sent upload"
            ),
            Err(err) => warn!(%id, serial, error = %err, "unable to send upload"),
        }
    });
}
