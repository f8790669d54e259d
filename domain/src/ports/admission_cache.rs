//! The request-time cache structures backing the admission gate.

use crate::coupon::{Coupon, CouponId, UserId};
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

/// Ephemeral admission structures (Redis in production).
///
/// The dedup set and the entry counter are the only objects in the system
/// that require store-level atomic mutation (add-if-absent, atomic
/// increment); everything else tolerates plain reads and writes.
pub trait AdmissionCache: Send + Sync {
    /// Cached coupon snapshot, if present.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Cache`] if the cache is unavailable.
    fn cached_coupon(&self, id: CouponId) -> impl Future<Output = Result<Option<Coupon>>> + Send;

    /// Populate the coupon snapshot with a bounded TTL (cache-aside fill).
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Cache`] if the cache is unavailable.
    fn cache_coupon(
        &self,
        coupon: &Coupon,
        ttl: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Add the user to the coupon's dedup set. Returns `true` when this is
    /// the user's first admission (the member was actually added).
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Cache`] if the cache is unavailable.
    fn add_dedup(
        &self,
        coupon_id: CouponId,
        user_id: UserId,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Remove the user from the dedup set (compensating rollback after a
    /// sold-out rejection or a failed publish).
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Cache`] if the cache is unavailable.
    fn remove_dedup(
        &self,
        coupon_id: CouponId,
        user_id: UserId,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Atomically increment the entry counter, returning the post-increment
    /// value: the requester's absolute entry order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Cache`] if the cache is unavailable.
    fn increment_entry(&self, coupon_id: CouponId) -> impl Future<Output = Result<u64>> + Send;

    /// Atomically decrement the entry counter (compensating rollback).
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Cache`] if the cache is unavailable.
    fn decrement_entry(&self, coupon_id: CouponId) -> impl Future<Output = Result<()>> + Send;

    /// Insert the user into the waiting queue ranked by arrival time.
    /// Add-if-absent: returns `false` when the user was already queued.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Cache`] if the cache is unavailable.
    fn push_waiting(
        &self,
        coupon_id: CouponId,
        user_id: UserId,
        arrived_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Oldest `limit` members of the waiting queue, in arrival order.
    /// Members are not removed; call [`AdmissionCache::remove_waiting`] for
    /// exactly the members that were dispatched.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Cache`] if the cache is unavailable.
    fn waiting_batch(
        &self,
        coupon_id: CouponId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<UserId>>> + Send;

    /// Remove the given members from the waiting queue.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Cache`] if the cache is unavailable.
    fn remove_waiting(
        &self,
        coupon_id: CouponId,
        user_ids: &[UserId],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Current waiting-queue depth for a coupon.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Cache`] if the cache is unavailable.
    fn waiting_depth(&self, coupon_id: CouponId) -> impl Future<Output = Result<u64>> + Send;

    /// Whether the sold-out flag is set for this coupon.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Cache`] if the cache is unavailable.
    fn is_sold_out(&self, coupon_id: CouponId) -> impl Future<Output = Result<bool>> + Send;

    /// Set the sold-out flag (short-circuits later admissions and dispatch
    /// cycles).
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Cache`] if the cache is unavailable.
    fn mark_sold_out(&self, coupon_id: CouponId) -> impl Future<Output = Result<()>> + Send;
}
