//! Producer side of the fulfillment message queue.

use crate::error::Result;
use crate::message::CouponIssueMessage;
use std::future::Future;

/// Publishes fulfillment requests to a durable, at-least-once topic.
///
/// Publishes are awaited to completion so callers can compensate (roll back
/// admission state) when the broker rejects a message.
pub trait IssuePublisher: Send + Sync {
    /// Publish one message to `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Publish`] when the broker does not
    /// confirm the write.
    fn publish(
        &self,
        topic: &str,
        message: &CouponIssueMessage,
    ) -> impl Future<Output = Result<()>> + Send;
}
