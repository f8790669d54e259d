//! Explicit poll-and-ack consumer driver.
//!
//! The driver owns the ack ladder for fulfillment messages:
//! - handler settles the message (`Ok`) or fails it with a business error:
//!   commit the offset, the message is done;
//! - handler fails with anything else: redeliver in-process with a backoff,
//!   up to a configured cap;
//! - cap exhausted, or the payload does not decode: publish the raw payload
//!   to the topic's dead-letter twin, then commit.
//!
//! Offsets are never committed ahead of settlement, so a crash mid-message
//! redelivers it (at-least-once). Handlers are idempotent by construction:
//! the database's uniqueness constraint absorbs duplicate deliveries.

use coupon_domain::message::dead_letter_topic;
use coupon_domain::{CouponError, CouponIssueMessage, Result};
use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::time::Duration;

/// Processes one decoded fulfillment message.
pub trait MessageHandler: Send + Sync {
    /// Settle one message.
    ///
    /// Returning `Ok` acknowledges the message. Returning a business error
    /// also acknowledges it (redelivery cannot fix a business outcome); any
    /// other error requests redelivery.
    ///
    /// # Errors
    ///
    /// See above; the error's classification drives the ack ladder.
    fn handle(&self, message: CouponIssueMessage) -> impl Future<Output = Result<()>> + Send;
}

/// Consumer wiring.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Comma-separated broker addresses.
    pub brokers: String,
    /// Consumer group id.
    pub group_id: String,
    /// Topics to subscribe to.
    pub topics: Vec<String>,
    /// In-process redeliveries before a message is parked on the DLT.
    pub max_redeliveries: u32,
    /// Pause between redeliveries of the same message.
    pub redelivery_backoff: Duration,
}

impl ConsumerConfig {
    /// Config with the default redelivery policy (3 attempts, 1s apart).
    #[must_use]
    pub fn new(
        brokers: impl Into<String>,
        group_id: impl Into<String>,
        topics: Vec<String>,
    ) -> Self {
        Self {
            brokers: brokers.into(),
            group_id: group_id.into(),
            topics,
            max_redeliveries: 3,
            redelivery_backoff: Duration::from_secs(1),
        }
    }
}

/// Kafka consumer loop for fulfillment messages.
pub struct IssueConsumer {
    consumer: StreamConsumer,
    dlt_producer: FutureProducer,
    config: ConsumerConfig,
}

impl IssueConsumer {
    /// Create the consumer and subscribe to the configured topics.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::Publish`] when the consumer or the DLT
    /// producer cannot be created, or the subscription fails.
    pub fn new(config: ConsumerConfig) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            // Commits happen only after settlement, never on a timer.
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| CouponError::Publish {
                topic: config.topics.join(","),
                reason: format!("failed to create consumer: {e}"),
            })?;

        let topic_refs: Vec<&str> = config.topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topic_refs)
            .map_err(|e| CouponError::Publish {
                topic: config.topics.join(","),
                reason: format!("failed to subscribe: {e}"),
            })?;

        let dlt_producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .create()
            .map_err(|e| CouponError::Publish {
                topic: config.topics.join(","),
                reason: format!("failed to create DLT producer: {e}"),
            })?;

        tracing::info!(
            topics = ?config.topics,
            group_id = %config.group_id,
            max_redeliveries = config.max_redeliveries,
            "issue consumer subscribed"
        );

        Ok(Self {
            consumer,
            dlt_producer,
            config,
        })
    }

    /// Consume until the stream ends (it does not, short of shutdown).
    pub async fn run<H: MessageHandler>(&self, handler: &H) {
        let mut stream = self.consumer.stream();

        while let Some(polled) = stream.next().await {
            let message = match polled {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to receive message");
                    continue;
                }
            };

            let topic = message.topic().to_string();
            let payload: Vec<u8> = message.payload().unwrap_or_default().to_vec();
            let key: Option<Vec<u8>> = message.key().map(<[u8]>::to_vec);

            match serde_json::from_slice::<CouponIssueMessage>(&payload) {
                Ok(decoded) => {
                    if !self.settle(handler, &topic, decoded).await {
                        self.send_to_dead_letter(&topic, &payload, key.as_deref())
                            .await;
                    }
                }
                Err(e) => {
                    // Poison pill: redelivery cannot fix a payload that does
                    // not decode.
                    tracing::error!(
                        topic = %topic,
                        offset = message.offset(),
                        error = %e,
                        "undecodable issue message; parking on DLT"
                    );
                    self.send_to_dead_letter(&topic, &payload, key.as_deref())
                        .await;
                }
            }

            if let Err(e) = self.consumer.commit_message(&message, CommitMode::Async) {
                tracing::warn!(
                    topic = %topic,
                    offset = message.offset(),
                    error = %e,
                    "failed to commit offset (message may be redelivered)"
                );
            }
        }

        tracing::info!("issue consumer stream ended");
    }

    /// Run the handler with the in-process redelivery policy. Returns `true`
    /// when the message settled, `false` when it belongs on the DLT.
    async fn settle<H: MessageHandler>(
        &self,
        handler: &H,
        topic: &str,
        message: CouponIssueMessage,
    ) -> bool {
        let attempts = self.config.max_redeliveries.saturating_add(1);
        for attempt in 1..=attempts {
            match handler.handle(message.clone()).await {
                Ok(()) => return true,
                Err(e) if e.is_business() => {
                    tracing::warn!(
                        topic = %topic,
                        user_id = %message.user_id,
                        coupon_id = %message.coupon_id,
                        error = %e,
                        "business failure; message settled"
                    );
                    return true;
                }
                Err(e) => {
                    tracing::warn!(
                        topic = %topic,
                        user_id = %message.user_id,
                        coupon_id = %message.coupon_id,
                        attempt = attempt,
                        attempts = attempts,
                        error = %e,
                        "handler failed; will redeliver"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.config.redelivery_backoff).await;
                    }
                }
            }
        }
        false
    }

    /// Forward the raw payload to `{topic}.dlt`. A DLT publish failure is
    /// logged and the offset is still committed: the failure store already
    /// holds the durable record for anything that got this far.
    async fn send_to_dead_letter(&self, topic: &str, payload: &[u8], key: Option<&[u8]>) {
        let dlt = dead_letter_topic(topic);
        let mut record = FutureRecord::to(&dlt).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }
        match self
            .dlt_producer
            .send(record, Timeout::After(Duration::from_secs(5)))
            .await
        {
            Ok((partition, offset)) => {
                tracing::error!(
                    topic = %topic,
                    dlt = %dlt,
                    partition = partition,
                    offset = offset,
                    "parked message on dead-letter topic"
                );
            }
            Err((e, _)) => {
                tracing::error!(
                    topic = %topic,
                    dlt = %dlt,
                    error = %e,
                    "failed to park message on dead-letter topic"
                );
            }
        }
    }
}
