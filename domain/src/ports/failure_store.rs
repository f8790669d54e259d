//! Durable store of fulfillment failures with retry bookkeeping.

use crate::coupon::{CouponId, UserId};
use crate::error::Result;
use crate::failure::{FailedIssuedCoupon, FailureId};
use chrono::{DateTime, Utc};
use std::future::Future;

/// Durable record of fulfillment failures.
///
/// `claim_attempt` is the single-writer construct: it is a compare-and-swap
/// on `retry_count`, so of two schedulers racing on the same row exactly one
/// observes a claim. The claim itself increments the count, making
/// `retry_count` a counter of attempts started.
pub trait FailureStore: Send + Sync {
    /// Write a failure record in its own transaction, independent of any
    /// ongoing unit of work, so rollback of the triggering operation cannot
    /// erase the evidence.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Store`] if the store is unavailable —
    /// the caller must then leave the message unacknowledged.
    fn record(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
        failed_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<FailedIssuedCoupon>> + Send;

    /// All unresolved failures with `retry_count < max_retry_count`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Store`] if the store is unavailable.
    fn find_retryable(
        &self,
        max_retry_count: u32,
    ) -> impl Future<Output = Result<Vec<FailedIssuedCoupon>>> + Send;

    /// Claim one retry attempt: atomically increment `retry_count` if it
    /// still equals `expected_retry_count` and the record is unresolved.
    /// Returns `false` when another scheduler already owns the attempt.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Store`] if the store is unavailable.
    fn claim_attempt(
        &self,
        id: FailureId,
        expected_retry_count: u32,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Flip the resolved flag after a successful reissue.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Store`] if the store is unavailable, and
    /// [`crate::CouponError::FailureRecordNotFound`] for an unknown id.
    fn mark_resolved(&self, id: FailureId) -> impl Future<Output = Result<()>> + Send;
}
