//! Kafka sink: publishes each event as JSON keyed by order id.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rdkafka::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::{error, info};

use crate::{Notifier, OrderEvent};

pub struct KafkaNotifier {
    producer: FutureProducer,
    topic: String,
}

impl KafkaNotifier {
    /// Creates the producer; does not contact the brokers yet.
    pub fn new(brokers: &[String], topic: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers.join(","))
            .set("message.timeout.ms", "5000")
            .create()
            .context("Failed to create Kafka producer")?;

        info!(topic = %topic, "Kafka notifier initialized");
        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for KafkaNotifier {
    async fn notify(&self, event: &OrderEvent) -> Result<()> {
        let key = event.order_id().to_string();
        let data = serde_json::to_string(event).context("Failed to serialize event to JSON")?;

        let record = FutureRecord::to(&self.topic).key(&key).payload(&data);

        match self
            .producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(kafka_err, _msg)| anyhow::anyhow!("Kafka error: {kafka_err:?}"))
            .context("Failed to send message to Kafka")
        {
            Ok(_) => {
                info!(order_id = %key, event = event.name(), "Event published successfully");
                Ok(())
            }
            Err(e) => {
                error!(error = ?e, "Failed to publish event to Kafka");
                Err(e)
            }
        }
    }
}
