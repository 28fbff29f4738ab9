use crate::broker::{Broker, BrokerError, Delivery};
use crate::partition::PartitionAssignment;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Identity of one consumer worker, handed to every handler call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerContext {
    topic: Arc<str>,
    group: Arc<str>,
    worker: usize,
    partitions: Vec<u32>,
}

impl WorkerContext {
    pub fn new(
        topic: impl Into<Arc<str>>,
        group: impl Into<Arc<str>>,
        worker: usize,
        partitions: Vec<u32>,
    ) -> Self {
        Self {
            topic: topic.into(),
            group: group.into(),
            worker,
            partitions,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn partitions(&self) -> &[u32] {
        &self.partitions
    }
}

impl fmt::Display for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.topic, self.group, self.worker)
    }
}

/// Behavior required for any consumer worker.
///
/// `Ok` acknowledges the delivery; `Err` rejects it and the broker redelivers.
#[async_trait]
pub trait DeliveryHandler<M>: Send + Sync + 'static
where
    M: Send + Sync + 'static,
{
    async fn handle(&self, ctx: &WorkerContext, delivery: &Delivery<M>) -> anyhow::Result<()>;
}

/// Topic, group and worker count for one consumer group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSpec {
    pub topic: String,
    pub group: String,
    pub workers: usize,
}

impl ConsumerSpec {
    pub fn new(topic: impl Into<String>, group: impl Into<String>, workers: usize) -> Self {
        Self {
            topic: topic.into(),
            group: group.into(),
            workers,
        }
    }
}

/// Opens one subscription per active worker and runs each on its own task.
///
/// Workers settle one delivery at a time. Cancellation is observed between
/// deliveries: a handler that already started runs to completion.
pub async fn spawn_workers<M>(
    broker: Arc<dyn Broker<M>>,
    spec: ConsumerSpec,
    handler: Arc<dyn DeliveryHandler<M>>,
    cancel: CancellationToken,
) -> Result<Vec<JoinHandle<()>>, BrokerError>
where
    M: Send + Sync + 'static,
{
    let partitions = broker.partition_count(&spec.topic)?;
    let assignment = PartitionAssignment::round_robin(partitions, spec.workers)?;
    let mut handles = Vec::new();
    for (worker, owned) in assignment.active_workers() {
        let ctx = WorkerContext::new(
            spec.topic.as_str(),
            spec.group.as_str(),
            worker,
            owned.to_vec(),
        );
        let subscription = broker.subscribe(&spec.topic, &spec.group, owned).await?;
        let handler = Arc::clone(&handler);
        let cancel = cancel.clone();
        handles.push(tokio::spawn(run_worker(ctx, subscription, handler, cancel)));
    }
    info!(
        topic = %spec.topic,
        group = %spec.group,
        workers = handles.len(),
        "consumer group started"
    );
    Ok(handles)
}

async fn run_worker<M>(
    ctx: WorkerContext,
    mut subscription: Box<dyn crate::broker::Subscription<M>>,
    handler: Arc<dyn DeliveryHandler<M>>,
    cancel: CancellationToken,
) where
    M: Send + Sync + 'static,
{
    debug!(worker = %ctx, partitions = ?ctx.partitions(), "consumer worker running");
    loop {
        let delivery = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            delivery = subscription.next() => match delivery {
                Some(delivery) => delivery,
                None => break,
            },
        };
        match handler.handle(&ctx, &delivery).await {
            Ok(()) => subscription.ack(&delivery),
            Err(err) => {
                warn!(
                    worker = %ctx,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    attempt = delivery.attempt,
                    error = %err,
                    "delivery failed, requesting redelivery"
                );
                subscription.nack(&delivery);
            }
        }
    }
    debug!(worker = %ctx, "consumer worker stopped");
}
