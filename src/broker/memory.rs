use super::{Broker, BrokerError, Delivery, PublishReceipt, Subscription};
use crate::partition::partition_for_key;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Delivery behaviour of the in-process broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryBrokerConfig {
    /// Redeliveries allowed per record before the broker gives up and skips
    /// it. `None` redelivers forever.
    pub redelivery_limit: Option<u32>,
    /// Chance that a publish is rejected.
    pub publish_failure_probability: f64,
    /// Chance that an acknowledgement is lost and the record comes back.
    pub redeliver_after_ack_probability: f64,
}

impl Default for MemoryBrokerConfig {
    fn default() -> Self {
        Self {
            redelivery_limit: None,
            publish_failure_probability: 0.0,
            redeliver_after_ack_probability: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredRecord<M> {
    key: String,
    message: M,
}

struct TopicLog<M> {
    name: String,
    partitions: Vec<Mutex<Vec<StoredRecord<M>>>>,
    appended: Notify,
    closed: AtomicBool,
}

impl<M: Clone> TopicLog<M> {
    fn record_at(&self, partition: u32, offset: u64) -> Option<StoredRecord<M>> {
        let log = self.partitions.get(partition as usize)?.lock();
        log.get(offset as usize).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupPartition {
    topic: String,
    group: String,
    partition: u32,
}

type CommittedOffsets = Arc<Mutex<HashMap<GroupPartition, u64>>>;

/// In-process partitioned log with consumer-group offsets and at-least-once
/// redelivery.
pub struct MemoryBroker<M> {
    topics: RwLock<HashMap<String, Arc<TopicLog<M>>>>,
    committed: CommittedOffsets,
    config: MemoryBrokerConfig,
}

impl<M> MemoryBroker<M>
where
    M: Clone + Send + Sync + 'static,
{
    pub fn new(config: MemoryBrokerConfig) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            committed: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Creates `name` with `partitions` partitions. Existing topics are kept.
    pub fn create_topic(&self, name: &str, partitions: u32) -> Result<(), BrokerError> {
        if partitions == 0 {
            return Err(crate::partition::PartitionError::NoPartitions.into());
        }
        let mut topics = self.topics.write();
        topics.entry(name.to_string()).or_insert_with(|| {
            info!(topic = name, partitions, "topic created");
            Arc::new(TopicLog {
                name: name.to_string(),
                partitions: (0..partitions).map(|_| Mutex::new(Vec::new())).collect(),
                appended: Notify::new(),
                closed: AtomicBool::new(false),
            })
        });
        Ok(())
    }

    /// Wakes every subscription and makes further `next` calls return `None`.
    pub fn close(&self) {
        for topic in self.topics.read().values() {
            topic.closed.store(true, Ordering::SeqCst);
            topic.appended.notify_waiters();
        }
    }

    /// Every record of `topic`, partition by partition, in offset order.
    pub fn records(&self, topic: &str) -> Result<Vec<Delivery<M>>, BrokerError> {
        let log = self.topic(topic)?;
        let mut records = Vec::new();
        for (partition, entries) in log.partitions.iter().enumerate() {
            for (offset, record) in entries.lock().iter().enumerate() {
                records.push(Delivery {
                    topic: log.name.clone(),
                    partition: partition as u32,
                    offset: offset as u64,
                    key: record.key.clone(),
                    message: record.message.clone(),
                    attempt: 0,
                });
            }
        }
        Ok(records)
    }

    /// Next offset `group` will read from `partition`, if it ever committed.
    pub fn committed_offset(&self, topic: &str, group: &str, partition: u32) -> Option<u64> {
        self.committed
            .lock()
            .get(&GroupPartition {
                topic: topic.to_string(),
                group: group.to_string(),
                partition,
            })
            .copied()
    }

    fn topic(&self, name: &str) -> Result<Arc<TopicLog<M>>, BrokerError> {
        self.topics
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| BrokerError::UnknownTopic(name.to_string()))
    }
}

impl<M> Default for MemoryBroker<M>
where
    M: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(MemoryBrokerConfig::default())
    }
}

#[async_trait]
impl<M> Broker<M> for MemoryBroker<M>
where
    M: Clone + Send + Sync + 'static,
{
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        message: M,
    ) -> Result<PublishReceipt, BrokerError> {
        let log = self.topic(topic)?;
        if roll(self.config.publish_failure_probability) {
            return Err(BrokerError::PublishFailed {
                topic: topic.to_string(),
                reason: "injected broker rejection".into(),
            });
        }
        let partition = partition_for_key(key, log.partitions.len() as u32)?;
        let offset = {
            let mut entries = log.partitions[partition as usize].lock();
            entries.push(StoredRecord {
                key: key.to_string(),
                message,
            });
            (entries.len() - 1) as u64
        };
        log.appended.notify_waiters();
        Ok(PublishReceipt {
            topic: topic.to_string(),
            partition,
            offset,
        })
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        partitions: &[u32],
    ) -> Result<Box<dyn Subscription<M>>, BrokerError> {
        let log = self.topic(topic)?;
        let mut positions = Vec::with_capacity(partitions.len());
        {
            let committed = self.committed.lock();
            for partition in partitions {
                if *partition as usize >= log.partitions.len() {
                    return Err(BrokerError::UnknownPartition {
                        topic: topic.to_string(),
                        partition: *partition,
                    });
                }
                let key = GroupPartition {
                    topic: topic.to_string(),
                    group: group.to_string(),
                    partition: *partition,
                };
                positions.push(committed.get(&key).copied().unwrap_or(0));
            }
        }
        debug!(topic, group, ?partitions, "subscription opened");
        Ok(Box::new(MemorySubscription {
            log,
            group: group.to_string(),
            partitions: partitions.to_vec(),
            positions,
            attempts: HashMap::new(),
            cursor: 0,
            committed: Arc::clone(&self.committed),
            config: self.config.clone(),
        }))
    }

    fn partition_count(&self, topic: &str) -> Result<u32, BrokerError> {
        Ok(self.topic(topic)?.partitions.len() as u32)
    }
}

struct MemorySubscription<M> {
    log: Arc<TopicLog<M>>,
    group: String,
    partitions: Vec<u32>,
    positions: Vec<u64>,
    attempts: HashMap<(u32, u64), u32>,
    cursor: usize,
    committed: CommittedOffsets,
    config: MemoryBrokerConfig,
}

impl<M: Clone> MemorySubscription<M> {
    /// Hands out the next unread record, rotating over owned partitions.
    fn poll_ready(&mut self) -> Option<Delivery<M>> {
        let owned = self.partitions.len();
        for step in 0..owned {
            let idx = (self.cursor + step) % owned;
            let partition = self.partitions[idx];
            let offset = self.positions[idx];
            let Some(record) = self.log.record_at(partition, offset) else {
                continue;
            };
            self.positions[idx] = offset + 1;
            self.cursor = idx + 1;
            let attempt = self.attempts.entry((partition, offset)).or_insert(0);
            *attempt += 1;
            return Some(Delivery {
                topic: self.log.name.clone(),
                partition,
                offset,
                key: record.key,
                message: record.message,
                attempt: *attempt,
            });
        }
        None
    }

    fn position_index(&self, partition: u32) -> Option<usize> {
        self.partitions.iter().position(|owned| *owned == partition)
    }

    fn seek(&mut self, partition: u32, offset: u64) {
        if let Some(idx) = self.position_index(partition) {
            self.positions[idx] = offset;
        }
    }

    fn commit(&mut self, partition: u32, next_offset: u64) {
        self.attempts.retain(|(p, o), _| *p != partition || *o >= next_offset);
        let key = GroupPartition {
            topic: self.log.name.clone(),
            group: self.group.clone(),
            partition,
        };
        let mut committed = self.committed.lock();
        let entry = committed.entry(key).or_insert(0);
        *entry = (*entry).max(next_offset);
    }
}

#[async_trait]
impl<M> Subscription<M> for MemorySubscription<M>
where
    M: Clone + Send + Sync + 'static,
{
    async fn next(&mut self) -> Option<Delivery<M>> {
        loop {
            let log = Arc::clone(&self.log);
            let notified = log.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if log.closed.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(delivery) = self.poll_ready() {
                return Some(delivery);
            }
            notified.await;
        }
    }

    fn ack(&mut self, delivery: &Delivery<M>) {
        if roll(self.config.redeliver_after_ack_probability) {
            info!(
                topic = %delivery.topic,
                partition = delivery.partition,
                offset = delivery.offset,
                "acknowledgement lost, record will be redelivered"
            );
            self.seek(delivery.partition, delivery.offset);
            return;
        }
        self.commit(delivery.partition, delivery.offset + 1);
    }

    fn nack(&mut self, delivery: &Delivery<M>) {
        match self.config.redelivery_limit {
            Some(limit) if delivery.attempt > limit => {
                warn!(
                    topic = %delivery.topic,
                    group = %self.group,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    attempts = delivery.attempt,
                    "redelivery limit reached, skipping record"
                );
                self.commit(delivery.partition, delivery.offset + 1);
            }
            _ => self.seek(delivery.partition, delivery.offset),
        }
    }
}

fn roll(probability: f64) -> bool {
    probability > 0.0 && rand::thread_rng().gen_bool(probability.min(1.0))
}
