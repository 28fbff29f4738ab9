//! Event entity plus the reducers that certify what reached the downstream topic.
//!
//! `verifier` reconstructs serial order and reports gaps and duplicates;
//! `tally` is the order-insensitive per-id counter.

pub mod event;
pub mod tally;
pub mod verifier;

pub use event::{Event, EventId};
pub use tally::{KeyTally, TallySummary};
pub use verifier::{Arrival, Verifier, VerifierStatus};
