//! The admission gate.
//!
//! Decides SUCCESS / DUPLICATE / SOLD_OUT per request using only the cache.
//! The relational store is touched at most once per coupon per TTL window,
//! to fill the snapshot.

use crate::config::AdmissionConfig;
use chrono::{DateTime, Utc};
use coupon_domain::ports::{AdmissionCache, CouponStore};
use coupon_domain::{Coupon, CouponId, IssueRequestResult, Result, UserId};

/// Cache-only admission decisions.
#[derive(Clone)]
pub struct AdmissionGate<C, S> {
    cache: C,
    coupons: S,
    config: AdmissionConfig,
}

impl<C, S> AdmissionGate<C, S>
where
    C: AdmissionCache,
    S: CouponStore,
{
    /// Build a gate over a cache and a coupon store.
    pub const fn new(cache: C, coupons: S, config: AdmissionConfig) -> Self {
        Self {
            cache,
            coupons,
            config,
        }
    }

    /// Load the coupon, cache-aside.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::CouponNotFound`] for an unknown id, or a cache
    /// or store error.
    ///
    /// [`CouponError::CouponNotFound`]: coupon_domain::CouponError::CouponNotFound
    pub async fn load_coupon(&self, coupon_id: CouponId) -> Result<Coupon> {
        if let Some(coupon) = self.cache.cached_coupon(coupon_id).await? {
            return Ok(coupon);
        }
        let coupon = self
            .coupons
            .find_by_id(coupon_id)
            .await?
            .ok_or(coupon_domain::CouponError::CouponNotFound)?;
        self.cache
            .cache_coupon(&coupon, self.config.coupon_cache_ttl)
            .await?;
        Ok(coupon)
    }

    /// Run the admission algorithm for one request.
    ///
    /// Order matters: validity first (a rejected request leaves no admission
    /// state behind), then dedup, then the atomic counter. A counter value
    /// past the quantity rolls both structures back so the slot math stays
    /// exact for everyone else.
    ///
    /// # Errors
    ///
    /// Business validation errors (coupon not issuable) and cache errors
    /// propagate; duplicate and sold-out are values, not errors.
    pub async fn admit(
        &self,
        user_id: UserId,
        coupon: &Coupon,
        now: DateTime<Utc>,
    ) -> Result<IssueRequestResult> {
        coupon.ensure_issuable(now)?;

        if self.cache.is_sold_out(coupon.id).await? {
            tracing::debug!(coupon_id = %coupon.id, user_id = %user_id, "sold-out short circuit");
            return Ok(IssueRequestResult::SoldOut);
        }

        let first_admission = self.cache.add_dedup(coupon.id, user_id).await?;
        if !first_admission {
            tracing::debug!(coupon_id = %coupon.id, user_id = %user_id, "duplicate admission");
            return Ok(IssueRequestResult::Duplicate);
        }

        let entry_order = self.cache.increment_entry(coupon.id).await?;
        if entry_order > u64::from(coupon.total_quantity) {
            self.rollback(coupon.id, user_id).await?;
            tracing::debug!(
                coupon_id = %coupon.id,
                user_id = %user_id,
                entry_order = entry_order,
                total_quantity = coupon.total_quantity,
                "admission past quantity"
            );
            return Ok(IssueRequestResult::SoldOut);
        }

        tracing::debug!(
            coupon_id = %coupon.id,
            user_id = %user_id,
            entry_order = entry_order,
            "admission success"
        );
        Ok(IssueRequestResult::Success)
    }

    /// Undo an admission: remove the dedup member and give the slot back.
    ///
    /// Used both for the over-quantity path and by issue strategies that
    /// fail to hand the admitted request off (e.g. a failed publish).
    ///
    /// # Errors
    ///
    /// Returns a cache error when the rollback writes fail.
    pub async fn rollback(&self, coupon_id: CouponId, user_id: UserId) -> Result<()> {
        self.cache.decrement_entry(coupon_id).await?;
        self.cache.remove_dedup(coupon_id, user_id).await?;
        Ok(())
    }

    /// The gate's admission config.
    pub const fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// The underlying cache handle.
    pub const fn cache(&self) -> &C {
        &self.cache
    }
}
