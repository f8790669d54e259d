//! Coupon usage.
//!
//! Consuming an issued coupon flips its `used` flag exactly once; the flip
//! is irreversible and a second attempt fails closed.

use chrono::{DateTime, Utc};
use coupon_domain::ports::{CouponStore, IssuanceStore};
use coupon_domain::{CouponError, CouponId, IssuedCoupon, Result, UserId};

/// Use-once consumption of issued coupons.
#[derive(Clone)]
pub struct UsageService<S, I> {
    coupons: S,
    issuances: I,
}

impl<S, I> UsageService<S, I>
where
    S: CouponStore,
    I: IssuanceStore,
{
    /// Wire the service.
    pub const fn new(coupons: S, issuances: I) -> Self {
        Self { coupons, issuances }
    }

    /// Consume one issued coupon.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::CouponNotFound`] or
    /// [`CouponError::IssuedCouponNotFound`] for missing rows,
    /// [`CouponError::NotCurrentlyUsable`] outside the validity window, and
    /// [`CouponError::AlreadyUsed`] on a second consumption.
    pub async fn use_coupon(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
        now: DateTime<Utc>,
    ) -> Result<IssuedCoupon> {
        let coupon = self
            .coupons
            .find_by_id(coupon_id)
            .await?
            .ok_or(CouponError::CouponNotFound)?;
        coupon.ensure_usable(now)?;

        let mut issued = self
            .issuances
            .find(user_id, coupon_id)
            .await?
            .ok_or(CouponError::IssuedCouponNotFound)?;
        issued.use_at(now)?;
        self.issuances.mark_used(issued.id, now).await?;

        tracing::info!(
            issued_coupon_id = %issued.id,
            user_id = %user_id,
            coupon_id = %coupon_id,
            "coupon used"
        );
        Ok(issued)
    }
}
