//! Kafka producer side of the fulfillment queue.

use coupon_domain::ports::IssuePublisher;
use coupon_domain::{CouponError, CouponIssueMessage, Result};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;

/// Kafka-backed [`IssuePublisher`].
///
/// Messages are JSON-encoded and keyed by user id, so every message for one
/// user lands on the same partition and replays in order. Sends are awaited
/// until the broker acknowledges the write; a publish that returns `Ok` is a
/// durable publish.
#[derive(Clone)]
pub struct KafkaIssueProducer {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaIssueProducer {
    /// Create a producer with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::Publish`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self> {
        Self::builder().brokers(brokers).build()
    }

    /// Start configuring a producer.
    #[must_use]
    pub fn builder() -> KafkaIssueProducerBuilder {
        KafkaIssueProducerBuilder::default()
    }
}

/// Builder for [`KafkaIssueProducer`].
#[derive(Default)]
pub struct KafkaIssueProducerBuilder {
    brokers: Option<String>,
    acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
}

impl KafkaIssueProducerBuilder {
    /// Comma-separated broker addresses.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Producer acknowledgment mode: "0", "1" or "all". Default: "all".
    #[must_use]
    pub fn acks(mut self, acks: impl Into<String>) -> Self {
        self.acks = Some(acks.into());
        self
    }

    /// Compression codec. Default: "none".
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Send timeout. Default: 5 seconds.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the producer.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::Publish`] if brokers are not configured or the
    /// underlying producer cannot be created.
    pub fn build(self) -> Result<KafkaIssueProducer> {
        let brokers = self.brokers.ok_or_else(|| CouponError::Publish {
            topic: String::new(),
            reason: "brokers not configured".to_string(),
        })?;

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            // Issuance slots are already claimed when a message is published;
            // a lost message is a lost coupon, so wait for full replication.
            .set("acks", self.acks.as_deref().unwrap_or("all"))
            .set(
                "compression.type",
                self.compression.as_deref().unwrap_or("none"),
            )
            .create()
            .map_err(|e| CouponError::Publish {
                topic: String::new(),
                reason: format!("failed to create producer: {e}"),
            })?;

        tracing::info!(brokers = %brokers, "Kafka issue producer created");

        Ok(KafkaIssueProducer {
            producer,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
        })
    }
}

impl IssuePublisher for KafkaIssueProducer {
    async fn publish(&self, topic: &str, message: &CouponIssueMessage) -> Result<()> {
        let payload = serde_json::to_vec(message).map_err(|e| {
            CouponError::Decode(format!("failed to encode issue message: {e}"))
        })?;
        let key = message.user_id.to_string();

        let record = FutureRecord::to(topic).payload(&payload).key(&key);

        match self.producer.send(record, Timeout::After(self.timeout)).await {
            Ok((partition, offset)) => {
                tracing::debug!(
                    topic = %topic,
                    partition = partition,
                    offset = offset,
                    user_id = %message.user_id,
                    coupon_id = %message.coupon_id,
                    "published issue message"
                );
                Ok(())
            }
            Err((kafka_error, _)) => {
                tracing::error!(
                    topic = %topic,
                    error = %kafka_error,
                    "failed to publish issue message"
                );
                Err(CouponError::Publish {
                    topic: topic.to_string(),
                    reason: kafka_error.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_without_brokers_is_a_publish_error() {
        let result = KafkaIssueProducer::builder().build();
        assert!(matches!(result, Err(CouponError::Publish { .. })));
    }
}
