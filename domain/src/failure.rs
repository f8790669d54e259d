//! Failure record: durable evidence that a fulfillment attempt could not
//! complete, with retry bookkeeping.

use crate::coupon::{CouponId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a failure record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FailureId(pub Uuid);

impl FailureId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FailureId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FailureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A fulfillment failure awaiting retry.
///
/// Written by the fulfillment worker when it hits an infrastructure error it
/// cannot resolve in place, read back by the retry scheduler. `retry_count`
/// only grows; `resolved` flips once when a reissue succeeds. A record whose
/// `retry_count` reaches the configured maximum is left unresolved for
/// manual intervention, never deleted automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedIssuedCoupon {
    /// Row identity, carried in retry messages as the reissue reference.
    pub id: FailureId,
    /// User whose issuance failed.
    pub user_id: UserId,
    /// Coupon whose issuance failed.
    pub coupon_id: CouponId,
    /// When the failure was recorded.
    pub failed_at: DateTime<Utc>,
    /// Number of retry attempts started for this record.
    pub retry_count: u32,
    /// Whether a retry has succeeded.
    pub resolved: bool,
}

impl FailedIssuedCoupon {
    /// Record a fresh, unresolved failure.
    #[must_use]
    pub fn new(user_id: UserId, coupon_id: CouponId, failed_at: DateTime<Utc>) -> Self {
        Self {
            id: FailureId::new(),
            user_id,
            coupon_id,
            failed_at,
            retry_count: 0,
            resolved: false,
        }
    }

    /// Mark the failure as resolved by a successful reissue.
    pub fn mark_resolved(&mut self) {
        self.resolved = true;
    }

    /// Count one more retry attempt.
    pub fn increase_retry_count(&mut self) {
        self.retry_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_count_is_monotonic() {
        let mut failure = FailedIssuedCoupon::new(UserId::new(), CouponId::new(), Utc::now());
        assert_eq!(failure.retry_count, 0);
        failure.increase_retry_count();
        failure.increase_retry_count();
        assert_eq!(failure.retry_count, 2);
    }

    #[test]
    fn starts_unresolved_and_resolves_once() {
        let mut failure = FailedIssuedCoupon::new(UserId::new(), CouponId::new(), Utc::now());
        assert!(!failure.resolved);
        failure.mark_resolved();
        assert!(failure.resolved);
    }
}
