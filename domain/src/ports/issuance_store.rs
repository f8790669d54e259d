//! Durable store of successful issuances.

use crate::coupon::{CouponId, UserId};
use crate::error::Result;
use crate::issued::{IssuedCoupon, IssuedCouponId};
use chrono::{DateTime, Utc};
use std::future::Future;

/// What an insert attempt found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written.
    Inserted,
    /// The (user, coupon) uniqueness constraint already held a row; the
    /// message was a duplicate delivery and the attempt is a no-op.
    AlreadyIssued,
}

/// Durable record of issuances, unique on (user, coupon).
pub trait IssuanceStore: Send + Sync {
    /// Insert an issuance, treating a concurrent uniqueness violation as
    /// [`InsertOutcome::AlreadyIssued`] rather than an error.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Store`] if the store is unavailable.
    fn insert(&self, issued: &IssuedCoupon) -> impl Future<Output = Result<InsertOutcome>> + Send;

    /// Load the issuance for a (user, coupon) pair, if any.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Store`] if the store is unavailable.
    fn find(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
    ) -> impl Future<Output = Result<Option<IssuedCoupon>>> + Send;

    /// Persist the used flag flip for one issuance.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Store`] if the store is unavailable.
    fn mark_used(
        &self,
        id: IssuedCouponId,
        used_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Number of persisted issuances for a coupon.
    ///
    /// The fulfillment worker compares this against the coupon's total
    /// quantity before inserting.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Store`] if the store is unavailable.
    fn count_by_coupon(&self, coupon_id: CouponId) -> impl Future<Output = Result<u64>> + Send;
}
