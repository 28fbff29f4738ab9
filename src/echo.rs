//! Publish-and-wait round trip over the broadcast greetings topic.

use crate::broker::{Broker, Delivery};
use crate::consumer::{DeliveryHandler, WorkerContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

/// Message carried on the greetings topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Greeting {
    pub message: String,
    pub sent_at_ms: u64,
}

impl Greeting {
    pub fn now(message: impl Into<String>) -> Self {
        let sent_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis().min(u128::from(u64::MAX)) as u64)
            .unwrap_or(0);
        Self {
            message: message.into(),
            sent_at_ms,
        }
    }
}

/// Consumer side of the round trip: queues every greeting this instance sees.
pub struct GreetingInbox {
    tx: mpsc::UnboundedSender<Greeting>,
}

#[async_trait]
impl DeliveryHandler<Greeting> for GreetingInbox {
    async fn handle(&self, ctx: &WorkerContext, delivery: &Delivery<Greeting>) -> anyhow::Result<()> {
        info!(
            group = ctx.group(),
            partition = delivery.partition,
            offset = delivery.offset,
            key = %delivery.key,
            greeting = %delivery.message.message,
            "received greeting"
        );
        // A closed receiver means the channel was dropped during shutdown.
        let _ = self.tx.send(delivery.message.clone());
        Ok(())
    }
}

/// Producer side of the round trip with a bounded wait for the reply.
pub struct EchoChannel {
    broker: Arc<dyn Broker<Greeting>>,
    topic: Arc<str>,
    inbox: Mutex<mpsc::UnboundedReceiver<Greeting>>,
    reply_timeout: Duration,
}

impl EchoChannel {
    /// Builds the channel and the inbox handler to subscribe on `topic`.
    pub fn new(
        broker: Arc<dyn Broker<Greeting>>,
        topic: impl Into<Arc<str>>,
        reply_timeout: Duration,
    ) -> (Self, GreetingInbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Self {
            broker,
            topic: topic.into(),
            inbox: Mutex::new(rx),
            reply_timeout,
        };
        (channel, GreetingInbox { tx })
    }

    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    /// Publishes `message` and returns the next greeting received, or `None`
    /// when nothing arrives within the reply timeout.
    pub async fn send_and_receive(&self, message: &str) -> Option<Greeting> {
        match self
            .broker
            .publish(&self.topic, message, Greeting::now(message))
            .await
        {
            Ok(receipt) => info!(greeting = message, offset = receipt.offset, "sent greeting"),
            Err(err) => warn!(greeting = message, error = %err, "unable to send greeting"),
        }
        self.receive().await
    }

    /// Waits up to the reply timeout for one greeting.
    pub async fn receive(&self) -> Option<Greeting> {
        let mut inbox = self.inbox.lock().await;
        tokio::time::timeout(self.reply_timeout, inbox.recv())
            .await
            .ok()
            .flatten()
    }
}
