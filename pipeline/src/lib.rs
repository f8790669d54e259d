//! First-come-first-served coupon issuance pipeline.
//!
//! The pipeline keeps the relational store off the hot path. A request never
//! touches Postgres: admission is decided entirely in the cache, fulfillment
//! happens asynchronously off a durable queue, and failures are recorded and
//! retried on a schedule.
//!
//! ```text
//! request ──► AdmissionGate ──► IssueStrategy
//!                                 │ direct: publish now
//!                                 │ queued: waiting queue ──► DispatchScheduler
//!                                 ▼
//!                            message queue ──► FulfillmentService ──► issued_coupons
//!                                                   │ infra failure
//!                                                   ▼
//!                                            failure store ──► RetryScheduler ──┐
//!                                                   ▲──────────(reissue)────────┘
//! ```
//!
//! Everything is generic over the ports in `coupon-domain`, so the whole
//! pipeline runs against the in-memory mocks in tests and against
//! Redis/Kafka/Postgres in the `coupon-worker` binary.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod admission;
pub mod config;
pub mod dispatch;
pub mod fulfillment;
pub mod issue;
pub mod retry;
pub mod usage;

pub use admission::AdmissionGate;
pub use config::{AdmissionConfig, DispatchConfig, FulfillmentConfig, RetryConfig};
pub use dispatch::DispatchScheduler;
pub use fulfillment::FulfillmentService;
pub use issue::{DirectIssueService, IssueStrategy, QueuedIssueService};
pub use retry::RetryScheduler;
pub use usage::UsageService;
