//! Kafka transport for coupon fulfillment messages.
//!
//! The producer implements the domain's [`IssuePublisher`] port with awaited,
//! broker-acknowledged sends. The consumer is an explicit poll-and-ack driver
//! with at-least-once semantics: offsets are committed only after the handler
//! settles a message, and messages that keep failing are parked on a
//! dead-letter topic instead of wedging the partition.
//!
//! [`IssuePublisher`]: coupon_domain::ports::IssuePublisher

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod consumer;
pub mod producer;

pub use consumer::{ConsumerConfig, IssueConsumer, MessageHandler};
pub use producer::KafkaIssueProducer;
