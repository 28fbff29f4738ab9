use async_trait::async_trait;
use parking_lot::Mutex;
use seqcheck::{
    spawn_workers, Broker, ConsumerSpec, Delivery, DeliveryHandler, MemoryBroker, WorkerContext,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Rejects every first attempt and records what it accepted.
#[derive(Default)]
struct RejectFirstAttempt {
    accepted: Mutex<Vec<(u64, u32)>>,
    workers: Mutex<Vec<String>>,
}

#[async_trait]
impl DeliveryHandler<u64> for RejectFirstAttempt {
    async fn handle(&self, ctx: &WorkerContext, delivery: &Delivery<u64>) -> anyhow::Result<()> {
        if delivery.attempt == 1 {
            anyhow::bail!("first attempt of {}", delivery.message);
        }
        self.accepted.lock().push((delivery.message, delivery.attempt));
        self.workers.lock().push(ctx.to_string());
        Ok(())
    }
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async move {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

#[tokio::test]
async fn rejected_deliveries_are_retried_until_accepted() {
    let broker = Arc::new(MemoryBroker::<u64>::default());
    broker.create_topic("numbers", 3).expect("topic");
    for value in 1..=9u64 {
        broker
            .publish("numbers", &format!("key-{value}"), value)
            .await
            .expect("publish");
    }

    let handler = Arc::new(RejectFirstAttempt::default());
    let cancel = CancellationToken::new();
    let workers = spawn_workers::<u64>(
        broker.clone(),
        ConsumerSpec::new("numbers", "g", 2),
        handler.clone(),
        cancel.clone(),
    )
    .await
    .expect("workers");
    assert_eq!(workers.len(), 2);

    wait_until(|| handler.accepted.lock().len() == 9).await;
    let mut accepted = handler.accepted.lock().clone();
    accepted.sort();
    let expected: Vec<_> = (1..=9u64).map(|value| (value, 2)).collect();
    assert_eq!(accepted, expected);
    assert!(handler
        .workers
        .lock()
        .iter()
        .all(|name| name.starts_with("numbers/g#")));

    cancel.cancel();
    for worker in workers {
        tokio::time::timeout(Duration::from_secs(2), worker)
            .await
            .expect("worker stops")
            .expect("join");
    }
}

#[tokio::test]
async fn idle_workers_are_not_spawned() {
    let broker = Arc::new(MemoryBroker::<u64>::default());
    broker.create_topic("numbers", 2).expect("topic");
    let cancel = CancellationToken::new();
    let workers = spawn_workers::<u64>(
        broker,
        ConsumerSpec::new("numbers", "g", 5),
        Arc::new(RejectFirstAttempt::default()),
        cancel.clone(),
    )
    .await
    .expect("workers");
    assert_eq!(workers.len(), 2);
    cancel.cancel();
}

#[tokio::test]
async fn unknown_topic_fails_to_start() {
    let broker = Arc::new(MemoryBroker::<u64>::default());
    let result = spawn_workers::<u64>(
        broker,
        ConsumerSpec::new("missing", "g", 1),
        Arc::new(RejectFirstAttempt::default()),
        CancellationToken::new(),
    )
    .await;
    assert!(result.is_err());
}

#[test]
fn worker_context_displays_its_identity() {
    let ctx = WorkerContext::new("uploads", "upload-processors", 3, vec![3]);
    assert_eq!(ctx.to_string(), "uploads/upload-processors#3");
    assert_eq!(ctx.partitions(), &[3]);
}
