//! Domain model for the first-come-first-served coupon issuance pipeline.
//!
//! This crate holds the single authoritative definition of every entity in
//! the system, the pure coupon status state machine, the error taxonomy, the
//! Kafka wire message, and the ports (traits) behind which the admission
//! cache, durable stores, distributed lock manager, and message queue live.
//!
//! # Architecture
//!
//! ```text
//! request ──► Admission Gate ──► waiting queue / publish ──► Fulfillment
//!                 │                                             Worker
//!                 ▼                                               │
//!          Admission Cache                          Issuance / Failure Store
//! ```
//!
//! The pipeline crates (`coupon-cache`, `coupon-kafka`, `coupon-postgres`,
//! `coupon-pipeline`) depend on this crate and never on each other's
//! concrete types. In-memory implementations of every port are available in
//! [`mocks`] (default `test-utils` feature) so the whole pipeline can be
//! exercised at memory speed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod coupon;
pub mod error;
pub mod failure;
pub mod issued;
pub mod message;
pub mod ports;

#[cfg(feature = "test-utils")]
pub mod mocks;

pub use coupon::{Coupon, CouponId, CouponStatus, CouponType, IssueRequestResult, UserId};
pub use error::{CouponError, Result};
pub use failure::{FailedIssuedCoupon, FailureId};
pub use issued::{IssuedCoupon, IssuedCouponId};
pub use message::{CouponIssueMessage, TOPIC_COUPON_ISSUE, TOPIC_COUPON_ISSUE_RETRY};
