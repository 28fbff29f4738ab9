use seqcheck::{
    partition_for_key, Broker, BrokerError, MemoryBroker, MemoryBrokerConfig, PartitionError,
    Subscription,
};
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_millis(100);

fn broker_with(config: MemoryBrokerConfig) -> MemoryBroker<String> {
    let broker = MemoryBroker::new(config);
    broker.create_topic("t", 3).expect("topic");
    broker
}

#[tokio::test]
async fn publish_routes_by_key_and_appends_in_order() {
    let broker = broker_with(MemoryBrokerConfig::default());
    let first = broker.publish("t", "alpha", "one".into()).await.expect("publish");
    let second = broker.publish("t", "alpha", "two".into()).await.expect("publish");

    let expected = partition_for_key("alpha", 3).expect("partition");
    assert_eq!(first.partition, expected);
    assert_eq!(second.partition, expected);
    assert_eq!(first.offset + 1, second.offset);

    let records = broker.records("t").expect("records");
    let messages: Vec<_> = records.iter().map(|r| r.message.as_str()).collect();
    assert_eq!(messages, vec!["one", "two"]);
    assert!(records.iter().all(|r| r.key == "alpha"));
}

#[tokio::test]
async fn rejects_unknown_topics_and_partitions() {
    let broker = broker_with(MemoryBrokerConfig::default());
    assert_eq!(
        broker.publish("missing", "k", "m".into()).await,
        Err(BrokerError::UnknownTopic("missing".into()))
    );
    assert!(matches!(
        broker.subscribe("t", "g", &[7]).await,
        Err(BrokerError::UnknownPartition { partition: 7, .. })
    ));
    assert_eq!(
        broker.create_topic("empty", 0),
        Err(BrokerError::Partition(PartitionError::NoPartitions))
    );

    let layout = BrokerError::from(PartitionError::NoWorkers);
    assert_eq!(layout.clone(), layout);
}

#[tokio::test]
async fn nack_redelivers_with_incremented_attempt() {
    let broker = broker_with(MemoryBrokerConfig::default());
    let receipt = broker.publish("t", "k", "m".into()).await.expect("publish");
    let mut sub = broker.subscribe("t", "g", &[0, 1, 2]).await.expect("subscribe");

    let first = sub.next().await.expect("delivery");
    assert_eq!(first.attempt, 1);
    sub.nack(&first);

    let second = sub.next().await.expect("redelivery");
    assert_eq!(second.offset, first.offset);
    assert_eq!(second.attempt, 2);
    sub.ack(&second);

    assert_eq!(
        broker.committed_offset("t", "g", receipt.partition),
        Some(receipt.offset + 1)
    );
    assert!(timeout(WAIT, sub.next()).await.is_err());
}

#[tokio::test]
async fn groups_consume_independently_and_resume_from_commit() {
    let broker = broker_with(MemoryBrokerConfig::default());
    let receipt = broker.publish("t", "k", "first".into()).await.expect("publish");
    let partitions = [receipt.partition];

    let mut a = broker.subscribe("t", "a", &partitions).await.expect("subscribe");
    let mut b = broker.subscribe("t", "b", &partitions).await.expect("subscribe");
    let from_a = a.next().await.expect("a delivery");
    let from_b = b.next().await.expect("b delivery");
    assert_eq!(from_a.message, "first");
    assert_eq!(from_b.message, "first");
    a.ack(&from_a);
    drop(a);

    broker.publish("t", "k", "second".into()).await.expect("publish");
    let mut resumed = broker.subscribe("t", "a", &partitions).await.expect("subscribe");
    let next = resumed.next().await.expect("delivery");
    assert_eq!(next.message, "second");
}

#[tokio::test]
async fn subscriber_wakes_on_later_publish() {
    let broker = std::sync::Arc::new(broker_with(MemoryBrokerConfig::default()));
    let mut sub = broker.subscribe("t", "g", &[0, 1, 2]).await.expect("subscribe");
    let publisher = std::sync::Arc::clone(&broker);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        publisher.publish("t", "late", "hello".into()).await
    });
    let delivery = timeout(Duration::from_secs(2), sub.next())
        .await
        .expect("woken")
        .expect("delivery");
    assert_eq!(delivery.message, "hello");
}

#[tokio::test]
async fn redelivery_limit_skips_poisoned_record() {
    let broker = broker_with(MemoryBrokerConfig {
        redelivery_limit: Some(1),
        ..MemoryBrokerConfig::default()
    });
    let receipt = broker.publish("t", "k", "poison".into()).await.expect("publish");
    let mut sub = broker
        .subscribe("t", "g", &[receipt.partition])
        .await
        .expect("subscribe");

    let first = sub.next().await.expect("delivery");
    sub.nack(&first);
    let second = sub.next().await.expect("redelivery");
    assert_eq!(second.attempt, 2);
    sub.nack(&second);

    assert_eq!(
        broker.committed_offset("t", "g", receipt.partition),
        Some(receipt.offset + 1)
    );
    assert!(timeout(WAIT, sub.next()).await.is_err());
}

#[tokio::test]
async fn lost_acknowledgement_redelivers_record() {
    let broker = broker_with(MemoryBrokerConfig {
        redeliver_after_ack_probability: 1.0,
        ..MemoryBrokerConfig::default()
    });
    let receipt = broker.publish("t", "k", "m".into()).await.expect("publish");
    let mut sub = broker
        .subscribe("t", "g", &[receipt.partition])
        .await
        .expect("subscribe");
    let first = sub.next().await.expect("delivery");
    sub.ack(&first);
    let again = sub.next().await.expect("redelivery");
    assert_eq!(again.offset, first.offset);
    assert_eq!(broker.committed_offset("t", "g", receipt.partition), None);
}

#[tokio::test]
async fn publish_failure_is_reported() {
    let broker = broker_with(MemoryBrokerConfig {
        publish_failure_probability: 1.0,
        ..MemoryBrokerConfig::default()
    });
    let err = broker
        .publish("t", "k", "m".into())
        .await
        .expect_err("rejected");
    assert!(matches!(err, BrokerError::PublishFailed { .. }));
    assert!(broker.records("t").expect("records").is_empty());
}

#[tokio::test]
async fn close_ends_pending_subscriptions() {
    let broker = std::sync::Arc::new(broker_with(MemoryBrokerConfig::default()));
    let mut sub = broker.subscribe("t", "g", &[0]).await.expect("subscribe");
    let waiter = tokio::spawn(async move { sub.next().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    broker.close();
    let result = timeout(Duration::from_secs(2), waiter)
        .await
        .expect("woken")
        .expect("join");
    assert!(result.is_none());
}
