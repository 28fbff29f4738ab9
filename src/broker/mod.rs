//! Publish/subscribe capability the pipeline runs on.
//!
//! Components only see [`Broker`] and [`Subscription`]; any transport that
//! offers keyed publish with an acknowledgement and per-partition ordered,
//! at-least-once consumption can stand behind them.

pub mod memory;

use crate::partition::PartitionError;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use memory::{MemoryBroker, MemoryBrokerConfig};

/// Acknowledgement returned once a record is durably appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReceipt {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
}

/// Record handed to a consumer, with enough metadata to settle it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery<M> {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub key: String,
    pub message: M,
    /// 1 on first delivery, incremented on every redelivery of the same offset.
    pub attempt: u32,
}

/// Errors surfaced by broker implementations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("unknown topic {0}")]
    UnknownTopic(String),
    #[error("topic {topic} has no partition {partition}")]
    UnknownPartition { topic: String, partition: u32 },
    #[error("publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },
    #[error(transparent)]
    Partition(#[from] PartitionError),
}

/// Keyed publish plus partition-scoped subscription.
#[async_trait]
pub trait Broker<M>: Send + Sync
where
    M: Send + 'static,
{
    /// Appends `message` to the partition selected by `key` and waits for the
    /// acknowledgement.
    async fn publish(&self, topic: &str, key: &str, message: M)
        -> Result<PublishReceipt, BrokerError>;

    /// Opens a consumer for `partitions` of `topic` on behalf of `group`,
    /// resuming from the group's committed offsets.
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        partitions: &[u32],
    ) -> Result<Box<dyn Subscription<M>>, BrokerError>;

    fn partition_count(&self, topic: &str) -> Result<u32, BrokerError>;
}

/// Ordered-per-partition stream of deliveries.
///
/// Every delivery must be settled with [`Subscription::ack`] or
/// [`Subscription::nack`] before the next call to [`Subscription::next`].
#[async_trait]
pub trait Subscription<M>: Send
where
    M: Send + 'static,
{
    /// Waits for the next record. `None` once the broker is closed.
    async fn next(&mut self) -> Option<Delivery<M>>;

    /// Commits the delivery's offset.
    fn ack(&mut self, delivery: &Delivery<M>);

    /// Rejects the delivery so that it is redelivered.
    fn nack(&mut self, delivery: &Delivery<M>);
}
