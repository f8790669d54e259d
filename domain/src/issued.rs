//! Issued coupon: the durable record of a successful issuance.

use crate::coupon::{CouponId, UserId};
use crate::error::{CouponError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of an issuance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssuedCouponId(pub Uuid);

impl IssuedCouponId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IssuedCouponId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IssuedCouponId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A single unit of a coupon issued to a single user.
///
/// The (`user_id`, `coupon_id`) pair is unique in the Issuance Store; that
/// constraint, not any cache state, is the source of truth for "has this
/// user already received this coupon". The `used` flag flips false→true
/// exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCoupon {
    /// Row identity.
    pub id: IssuedCouponId,
    /// Receiving user.
    pub user_id: UserId,
    /// Issued coupon definition.
    pub coupon_id: CouponId,
    /// Whether the unit has been consumed.
    pub used: bool,
    /// When the fulfillment worker persisted the issuance.
    pub issued_at: DateTime<Utc>,
    /// When the unit was consumed, if it has been.
    pub used_at: Option<DateTime<Utc>>,
}

impl IssuedCoupon {
    /// Create a fresh, unused issuance record.
    #[must_use]
    pub fn new(user_id: UserId, coupon_id: CouponId, issued_at: DateTime<Utc>) -> Self {
        Self {
            id: IssuedCouponId::new(),
            user_id,
            coupon_id,
            used: false,
            issued_at,
            used_at: None,
        }
    }

    /// Consume the unit.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::AlreadyUsed`] on the second and every later
    /// call; the flip is irreversible.
    pub fn use_at(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.used {
            return Err(CouponError::AlreadyUsed);
        }
        self.used = true;
        self.used_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn use_flips_exactly_once() {
        let mut issued = IssuedCoupon::new(UserId::new(), CouponId::new(), Utc::now());
        assert!(!issued.used);

        let used_at = Utc::now();
        assert_eq!(issued.use_at(used_at), Ok(()));
        assert!(issued.used);
        assert_eq!(issued.used_at, Some(used_at));

        assert_eq!(issued.use_at(Utc::now()), Err(CouponError::AlreadyUsed));
        // First usage timestamp is preserved.
        assert_eq!(issued.used_at, Some(used_at));
    }
}
