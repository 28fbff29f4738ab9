//! Fault-injecting transform stage between the upload and processed topics.
//!
//! A delivery either fails (before or after a simulated latency) or is marked
//! processed and republished. Failures are never retried here; the consumer
//! rejects the delivery and the broker redelivers it later, which is what
//! reorders and duplicates serials downstream.

use crate::broker::{Broker, BrokerError, Delivery, PublishReceipt};
use crate::consumer::{DeliveryHandler, WorkerContext};
use crate::event_model::Event;
use crate::faults::FaultSource;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Reasons a single processing attempt failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProcessError {
    #[error("simulated failure before processing serial {serial}")]
    InjectedBeforeProcessing { serial: u64 },
    #[error("simulated failure after processing serial {serial}")]
    InjectedAfterProcessing { serial: u64 },
    #[error("unable to send processed serial {serial}: {source}")]
    Publish {
        serial: u64,
        #[source]
        source: BrokerError,
    },
}

/// Transforms uploads and republishes them to the processed topic.
pub struct Processor {
    broker: Arc<dyn Broker<Event>>,
    output_topic: Arc<str>,
    faults: Arc<dyn FaultSource>,
}

impl Processor {
    pub fn new(
        broker: Arc<dyn Broker<Event>>,
        output_topic: impl Into<Arc<str>>,
        faults: Arc<dyn FaultSource>,
    ) -> Self {
        Self {
            broker,
            output_topic: output_topic.into(),
            faults,
        }
    }

    pub fn output_topic(&self) -> &str {
        &self.output_topic
    }

    /// Runs one attempt for `event` and waits for the downstream acknowledgement.
    pub async fn process(&self, event: Event) -> Result<PublishReceipt, ProcessError> {
        let serial = event.serial;
        if self.faults.fail_before_processing(&event) {
            return Err(ProcessError::InjectedBeforeProcessing { serial });
        }

        let delay = self.faults.processing_delay(&event);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.faults.fail_after_processing(&event) {
            return Err(ProcessError::InjectedAfterProcessing { serial });
        }

        let processed = event.into_processed();
        let key = processed.key();
        let id = processed.id;
        let receipt = self
            .broker
            .publish(&self.output_topic, &key, processed)
            .await
            .map_err(|source| {
                warn!(%id, serial, error = %source, "unable to send processed upload");
                ProcessError::Publish { serial, source }
            })?;
        info!(
            %id,
            serial,
            partition = receipt.partition,
            offset = receipt.offset,
            "sent processed upload"
        );
        Ok(receipt)
    }
}

#[async_trait]
impl DeliveryHandler<Event> for Processor {
    async fn handle(&self, ctx: &WorkerContext, delivery: &Delivery<Event>) -> anyhow::Result<()> {
        info!(
            worker = %ctx,
            partition = delivery.partition,
            offset = delivery.offset,
            key = %delivery.key,
            serial = delivery.message.serial,
            attempt = delivery.attempt,
            "received upload"
        );
        self.process(delivery.message.clone()).await?;
        Ok(())
    }
}
