//! Durable store of coupon definitions.

use crate::coupon::{Coupon, CouponId};
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::future::Future;

/// Durable record of coupon definitions.
pub trait CouponStore: Send + Sync {
    /// Load a coupon by id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Store`] if the store is unavailable.
    fn find_by_id(&self, id: CouponId) -> impl Future<Output = Result<Option<Coupon>>> + Send;

    /// Persist a new coupon definition.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Store`] if the store is unavailable.
    fn save(&self, coupon: &Coupon) -> impl Future<Output = Result<()>> + Send;

    /// All coupons whose computed status at `now` is `Active`.
    ///
    /// Used by the dispatch scheduler to decide which waiting queues to
    /// drain this cycle.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::Store`] if the store is unavailable.
    fn find_active(&self, now: DateTime<Utc>) -> impl Future<Output = Result<Vec<Coupon>>> + Send;
}
