//! The fulfillment worker.
//!
//! Consumes one `CouponIssueMessage` at a time and turns it into a durable
//! issuance row, or a durable failure record, before acknowledging. The
//! validate-and-insert sequence runs under a (coupon, user) lock; the
//! ledger's uniqueness constraint is the final idempotency barrier beneath
//! it, so duplicate deliveries collapse instead of over-issuing.

use crate::config::FulfillmentConfig;
use chrono::{DateTime, Utc};
use coupon_domain::ports::{
    coupon_user_lock_key, AdmissionCache, CouponStore, FailureStore, InsertOutcome, IssuanceStore,
    LockManager, LockSpec,
};
use coupon_domain::{
    Coupon, CouponError, CouponId, CouponIssueMessage, IssuedCoupon, Result,
};

/// Message-driven issuance persistence.
#[derive(Clone)]
pub struct FulfillmentService<S, C, I, F, L> {
    coupons: S,
    cache: C,
    issuances: I,
    failures: F,
    locks: L,
    config: FulfillmentConfig,
}

impl<S, C, I, F, L> FulfillmentService<S, C, I, F, L>
where
    S: CouponStore + Sync,
    C: AdmissionCache + Sync,
    I: IssuanceStore + Sync,
    F: FailureStore + Sync,
    L: LockManager,
{
    /// Wire the service.
    pub const fn new(
        coupons: S,
        cache: C,
        issuances: I,
        failures: F,
        locks: L,
        config: FulfillmentConfig,
    ) -> Self {
        Self {
            coupons,
            cache,
            issuances,
            failures,
            locks,
            config,
        }
    }

    /// Settle one message, owning the failure-recording half of the ack
    /// ladder.
    ///
    /// Outcomes:
    /// - fulfilled, or discarded as a business outcome: `Ok`;
    /// - business error: propagated (the consumer driver settles it,
    ///   redelivery cannot fix it);
    /// - infrastructure error on a first issue: a failure record is written
    ///   in its own transaction, then `Ok` — the retry scheduler owns it now;
    /// - infrastructure error on a reissue: `Ok` — the referenced failure
    ///   record is already the durable evidence, and the scheduler's claim
    ///   already counted this attempt;
    /// - failure-recording itself fails: the error propagates so the queue's
    ///   redelivery takes over. Acknowledging here would drop the request.
    ///
    /// # Errors
    ///
    /// See above.
    pub async fn handle_message(&self, message: CouponIssueMessage) -> Result<()> {
        let now = Utc::now();
        match self.fulfill(&message, now).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_business() => Err(e),
            Err(e) if message.is_reissue() => {
                tracing::warn!(
                    user_id = %message.user_id,
                    coupon_id = %message.coupon_id,
                    error = %e,
                    "reissue attempt failed; awaiting next retry scan"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %message.user_id,
                    coupon_id = %message.coupon_id,
                    error = %e,
                    "fulfillment failed; recording for retry"
                );
                match self
                    .failures
                    .record(message.user_id, message.coupon_id, now)
                    .await
                {
                    Ok(failure) => {
                        tracing::info!(
                            failure_id = %failure.id,
                            user_id = %message.user_id,
                            coupon_id = %message.coupon_id,
                            "failure recorded"
                        );
                        Ok(())
                    }
                    Err(record_err) => {
                        tracing::error!(
                            user_id = %message.user_id,
                            coupon_id = %message.coupon_id,
                            error = %record_err,
                            "failure recording itself failed; forcing redelivery"
                        );
                        Err(record_err)
                    }
                }
            }
        }
    }

    async fn fulfill(&self, message: &CouponIssueMessage, now: DateTime<Utc>) -> Result<()> {
        let spec = LockSpec::new(
            coupon_user_lock_key(message.coupon_id, message.user_id),
            self.config.lock_wait,
            self.config.lock_lease,
        );
        self.locks
            .with_lock(spec, || async move { self.fulfill_locked(message, now).await })
            .await
    }

    async fn fulfill_locked(&self, message: &CouponIssueMessage, now: DateTime<Utc>) -> Result<()> {
        let coupon = self.load_coupon(message.coupon_id).await?;
        coupon.ensure_issuable(now)?;

        // Duplicate delivery defense ahead of the constraint.
        if let Some(existing) = self
            .issuances
            .find(message.user_id, message.coupon_id)
            .await?
        {
            tracing::debug!(
                issued_coupon_id = %existing.id,
                user_id = %message.user_id,
                coupon_id = %message.coupon_id,
                "already issued; message settled"
            );
            return self.resolve_if_reissue(message).await;
        }

        let count = self.issuances.count_by_coupon(message.coupon_id).await?;
        if count >= u64::from(coupon.total_quantity) {
            // Quantity exhausted between admission and fulfillment. A
            // business outcome: the message is discarded, never retried.
            tracing::warn!(
                coupon_id = %message.coupon_id,
                user_id = %message.user_id,
                issued = count,
                total_quantity = coupon.total_quantity,
                "quantity exhausted at fulfillment; discarding"
            );
            self.flag_sold_out(message.coupon_id).await;
            return self.resolve_if_reissue(message).await;
        }

        let issued = IssuedCoupon::new(message.user_id, message.coupon_id, now);
        match self.issuances.insert(&issued).await? {
            InsertOutcome::Inserted => {
                tracing::info!(
                    issued_coupon_id = %issued.id,
                    user_id = %message.user_id,
                    coupon_id = %message.coupon_id,
                    "coupon issued"
                );
                if count + 1 >= u64::from(coupon.total_quantity) {
                    self.flag_sold_out(message.coupon_id).await;
                }
            }
            InsertOutcome::AlreadyIssued => {
                // Lost a race with a concurrent delivery; the constraint
                // kept the ledger single-rowed.
                tracing::debug!(
                    user_id = %message.user_id,
                    coupon_id = %message.coupon_id,
                    "insert collapsed onto existing issuance"
                );
            }
        }

        self.resolve_if_reissue(message).await
    }

    /// Cache-aside snapshot load, same shape as the admission side.
    async fn load_coupon(&self, coupon_id: CouponId) -> Result<Coupon> {
        if let Some(coupon) = self.cache.cached_coupon(coupon_id).await? {
            return Ok(coupon);
        }
        let coupon = self
            .coupons
            .find_by_id(coupon_id)
            .await?
            .ok_or(CouponError::CouponNotFound)?;
        self.cache
            .cache_coupon(&coupon, self.config.coupon_cache_ttl)
            .await?;
        Ok(coupon)
    }

    async fn resolve_if_reissue(&self, message: &CouponIssueMessage) -> Result<()> {
        let Some(failure_id) = message.failed_issued_coupon_id else {
            return Ok(());
        };
        match self.failures.mark_resolved(failure_id).await {
            Ok(()) => {
                tracing::info!(failure_id = %failure_id, "failure resolved by reissue");
                Ok(())
            }
            Err(CouponError::FailureRecordNotFound) => {
                tracing::warn!(
                    failure_id = %failure_id,
                    "reissue referenced a missing failure record"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// The flag is an admission-side optimization; losing the write must
    /// not fail an otherwise settled message.
    async fn flag_sold_out(&self, coupon_id: CouponId) {
        if let Err(e) = self.cache.mark_sold_out(coupon_id).await {
            tracing::warn!(
                coupon_id = %coupon_id,
                error = %e,
                "failed to set sold-out flag"
            );
        }
    }
}

impl<S, C, I, F, L> coupon_kafka::MessageHandler for FulfillmentService<S, C, I, F, L>
where
    S: CouponStore + Sync,
    C: AdmissionCache + Sync,
    I: IssuanceStore + Sync,
    F: FailureStore + Sync,
    L: LockManager,
{
    async fn handle(&self, message: CouponIssueMessage) -> Result<()> {
        self.handle_message(message).await
    }
}
