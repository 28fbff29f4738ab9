use seqcheck::{
    AppConfig, FaultSource, MemoryBrokers, Pipeline, Role, TestHook, TestHookRegistry,
};
use std::sync::Arc;
use std::time::Duration;

const ALL_ROLES: [Role; 4] = [Role::Generator, Role::Processor, Role::Verifier, Role::Tally];

fn small_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.topics.partitions = 3;
    config.processor.workers = 2;
    config.verifier.workers = 2;
    config
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async move {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

async fn start(config: &AppConfig, roles: &[Role], faults: Arc<dyn FaultSource>) -> (Pipeline, MemoryBrokers) {
    let brokers = MemoryBrokers::new(config).expect("brokers");
    let pipeline = Pipeline::start(config, roles, brokers.handles(), faults)
        .await
        .expect("pipeline starts");
    (pipeline, brokers)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scripted_faults_still_deliver_every_serial() {
    let config = small_config();
    let hooks = TestHookRegistry::with_hooks([
        TestHook::FailBefore { serial: 3, times: 2 },
        TestHook::FailAfter { serial: 7, times: 1 },
        TestHook::Delay {
            serial: 4,
            delay_ms: 150,
        },
    ]);
    let (pipeline, brokers) = start(&config, &ALL_ROLES, Arc::new(hooks)).await;

    let generator = pipeline.generator().expect("generator role");
    let verifier = pipeline.verifier().expect("verifier role");
    let tally = pipeline.tally().expect("tally role");
    assert!(generator.start(Duration::from_millis(2), 30));

    wait_until(|| verifier.status().is_complete(30)).await;
    let status = verifier.status();
    assert_eq!(status.last_contiguous_serial, 30);
    assert!(!status.unprocessed_detected);
    assert!(status.duplicates.is_empty());

    wait_until(|| tally.summary().unique == 30).await;
    assert_eq!(tally.summary().duplicated, 0);

    tokio::time::timeout(Duration::from_secs(5), pipeline.shutdown())
        .await
        .expect("workers stop");
    brokers.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lost_acknowledgements_surface_as_duplicates() {
    let mut config = small_config();
    config.broker.redeliver_after_ack_probability = 0.3;
    let (pipeline, brokers) = start(&config, &ALL_ROLES, Arc::new(TestHookRegistry::new())).await;

    let generator = pipeline.generator().expect("generator role");
    let verifier = pipeline.verifier().expect("verifier role");
    assert!(generator.start(Duration::from_millis(1), 20));

    wait_until(|| verifier.status().is_complete(20)).await;
    let status = verifier.status();
    assert!(status
        .duplicates
        .iter()
        .all(|event| (1..=20).contains(&event.serial) && event.processed));

    let tally = pipeline.tally().expect("tally role");
    wait_until(|| {
        let summary = tally.summary();
        summary.unique + summary.duplicated == 20
    })
    .await;
    assert!(
        !status.duplicates.is_empty() || tally.summary().duplicated > 0,
        "lost acknowledgements must redeliver at least one record"
    );

    pipeline.shutdown().await;
    brokers.close();
}

#[tokio::test]
async fn absent_roles_leave_components_disabled() {
    let config = small_config();
    let (pipeline, brokers) =
        start(&config, &[Role::Processor], Arc::new(TestHookRegistry::new())).await;
    assert!(pipeline.generator().is_none());
    assert!(pipeline.verifier().is_none());
    assert!(pipeline.tally().is_none());
    assert_eq!(pipeline.roles(), &[Role::Processor]);

    pipeline.shutdown().await;
    assert!(pipeline.shutdown_token().is_cancelled());
    brokers.close();
}

#[tokio::test]
async fn processor_alone_drains_the_upload_topic() {
    let config = small_config();
    let (producer, brokers) = start(&config, &[Role::Generator], Arc::new(TestHookRegistry::new())).await;
    let generator = producer.generator().expect("generator role");
    assert!(generator.start(Duration::from_millis(1), 10));
    wait_until(|| {
        brokers
            .events
            .records(&config.topics.uploads)
            .map(|records| records.len())
            .unwrap_or(0)
            == 10
    })
    .await;

    // A second instance sharing the brokers hosts only the processor.
    let consumer = Pipeline::start(
        &config,
        &[Role::Processor],
        brokers.handles(),
        Arc::new(TestHookRegistry::new()),
    )
    .await
    .expect("processor pipeline");
    wait_until(|| {
        brokers
            .events
            .records(&config.topics.processed)
            .map(|records| records.len())
            .unwrap_or(0)
            == 10
    })
    .await;

    producer.shutdown().await;
    consumer.shutdown().await;
    brokers.close();
}
