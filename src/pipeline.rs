//! Wires generator, processors, verifier and tally onto a broker.

use crate::broker::{Broker, BrokerError, MemoryBroker};
use crate::config::AppConfig;
use crate::consumer::{spawn_workers, ConsumerSpec};
use crate::echo::{EchoChannel, Greeting};
use crate::event_model::{Event, KeyTally, Verifier};
use crate::faults::FaultSource;
use crate::generator::Generator;
use crate::processor::Processor;
use crate::runtime::Role;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Broker handles for the two message types the pipeline carries.
#[derive(Clone)]
pub struct PipelineBrokers {
    pub events: Arc<dyn Broker<Event>>,
    pub greetings: Arc<dyn Broker<Greeting>>,
}

/// In-process brokers with every topic the pipeline needs.
pub struct MemoryBrokers {
    pub events: Arc<MemoryBroker<Event>>,
    pub greetings: Arc<MemoryBroker<Greeting>>,
}

impl MemoryBrokers {
    pub fn new(config: &AppConfig) -> Result<Self, BrokerError> {
        let events = Arc::new(MemoryBroker::new(config.broker.clone()));
        events.create_topic(&config.topics.uploads, config.topics.partitions)?;
        events.create_topic(&config.topics.processed, config.topics.partitions)?;
        let greetings = Arc::new(MemoryBroker::new(config.broker.clone()));
        greetings.create_topic(&config.topics.greetings, 1)?;
        Ok(Self { events, greetings })
    }

    pub fn handles(&self) -> PipelineBrokers {
        PipelineBrokers {
            events: self.events.clone(),
            greetings: self.greetings.clone(),
        }
    }

    pub fn close(&self) {
        self.events.close();
        self.greetings.close();
    }
}

/// Running set of components selected by the hosted roles.
pub struct Pipeline {
    roles: Vec<Role>,
    generator: Option<Arc<Generator>>,
    verifier: Option<Arc<Verifier>>,
    tally: Option<Arc<KeyTally>>,
    echo: Arc<EchoChannel>,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Pipeline {
    /// Creates the components for `roles` and starts their consumer groups.
    pub async fn start(
        config: &AppConfig,
        roles: &[Role],
        brokers: PipelineBrokers,
        faults: Arc<dyn FaultSource>,
    ) -> Result<Self, BrokerError> {
        let cancel = CancellationToken::new();
        let mut workers = Vec::new();
        let hosts = |role: Role| roles.contains(&role);

        let generator = hosts(Role::Generator).then(|| {
            Arc::new(Generator::new(
                Arc::clone(&brokers.events),
                config.topics.uploads.as_str(),
            ))
        });

        if hosts(Role::Processor) {
            let processor = Arc::new(Processor::new(
                Arc::clone(&brokers.events),
                config.topics.processed.as_str(),
                faults,
            ));
            let spec = ConsumerSpec::new(
                &config.topics.uploads,
                &config.processor.group,
                config.processor.workers,
            );
            workers.extend(
                spawn_workers::<Event>(Arc::clone(&brokers.events), spec, processor, cancel.clone())
                    .await?,
            );
        }

        let verifier = if hosts(Role::Verifier) {
            let verifier = Arc::new(Verifier::new());
            let spec = ConsumerSpec::new(
                &config.topics.processed,
                &config.verifier.group,
                config.verifier.workers,
            );
            workers.extend(
                spawn_workers::<Event>(
                    Arc::clone(&brokers.events),
                    spec,
                    verifier.clone(),
                    cancel.clone(),
                )
                .await?,
            );
            Some(verifier)
        } else {
            None
        };

        let tally = if hosts(Role::Tally) {
            let tally = Arc::new(KeyTally::new());
            let spec = ConsumerSpec::new(&config.topics.processed, &config.tally.group, 1);
            workers.extend(
                spawn_workers::<Event>(
                    Arc::clone(&brokers.events),
                    spec,
                    tally.clone(),
                    cancel.clone(),
                )
                .await?,
            );
            Some(tally)
        } else {
            None
        };

        // Broadcast: every instance reads every greeting through its own group.
        let (echo, inbox) = EchoChannel::new(
            Arc::clone(&brokers.greetings),
            config.topics.greetings.as_str(),
            config.echo.reply_timeout(),
        );
        let greetings_group = format!("greetings-{}", Uuid::new_v4().simple());
        let spec = ConsumerSpec::new(&config.topics.greetings, greetings_group, 1);
        workers.extend(
            spawn_workers::<Greeting>(
                Arc::clone(&brokers.greetings),
                spec,
                Arc::new(inbox),
                cancel.clone(),
            )
            .await?,
        );

        info!(?roles, workers = workers.len(), "pipeline started");
        Ok(Self {
            roles: roles.to_vec(),
            generator,
            verifier,
            tally,
            echo: Arc::new(echo),
            cancel,
            workers: Mutex::new(workers),
        })
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn generator(&self) -> Option<Arc<Generator>> {
        self.generator.clone()
    }

    pub fn verifier(&self) -> Option<Arc<Verifier>> {
        self.verifier.clone()
    }

    pub fn tally(&self) -> Option<Arc<KeyTally>> {
        self.tally.clone()
    }

    pub fn echo(&self) -> Arc<EchoChannel> {
        Arc::clone(&self.echo)
    }

    /// Token cancelled when the pipeline is asked to stop.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops the generator, signals every worker and waits for them to exit.
    ///
    /// A transform in flight runs to completion. Deliveries that were never
    /// acknowledged are redelivered to whichever consumer resumes the group.
    pub async fn shutdown(&self) {
        if let Some(generator) = &self.generator {
            generator.shutdown();
        }
        self.cancel.cancel();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(err) = worker.await {
                warn!(error = %err, "consumer worker ended abnormally");
            }
        }
        info!("pipeline stopped");
    }
}
