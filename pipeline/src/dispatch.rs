//! The dispatch scheduler.
//!
//! Drains the waiting queues of all active coupons in arrival-ordered
//! batches and publishes one fulfillment message per member. Queue removal
//! happens only after a successful publish, so a crash mid-batch can delay
//! a member but never lose it; the issuance ledger's uniqueness constraint
//! absorbs any resulting double-publish.

use crate::config::DispatchConfig;
use chrono::{DateTime, Utc};
use coupon_domain::ports::{AdmissionCache, CouponStore, IssuePublisher};
use coupon_domain::{CouponIssueMessage, Result, TOPIC_COUPON_ISSUE};

/// Periodic waiting-queue drain.
#[derive(Clone)]
pub struct DispatchScheduler<C, S, P> {
    cache: C,
    coupons: S,
    publisher: P,
    config: DispatchConfig,
}

impl<C, S, P> DispatchScheduler<C, S, P>
where
    C: AdmissionCache,
    S: CouponStore,
    P: IssuePublisher,
{
    /// Wire the scheduler.
    pub const fn new(cache: C, coupons: S, publisher: P, config: DispatchConfig) -> Self {
        Self {
            cache,
            coupons,
            publisher,
            config,
        }
    }

    /// Run one dispatch cycle over every active coupon.
    ///
    /// # Errors
    ///
    /// Returns store or cache errors that abort the scan itself; an
    /// individual member's publish failure only skips that member.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<()> {
        let mut total_waiting: u64 = 0;

        for coupon in self.coupons.find_active(now).await? {
            if self.cache.is_sold_out(coupon.id).await? {
                continue;
            }

            let batch = self
                .cache
                .waiting_batch(coupon.id, self.config.batch_size)
                .await?;
            if !batch.is_empty() {
                let mut dispatched = Vec::with_capacity(batch.len());
                for user_id in batch {
                    let message = CouponIssueMessage::first_issue(user_id, coupon.id);
                    match self.publisher.publish(TOPIC_COUPON_ISSUE, &message).await {
                        Ok(()) => dispatched.push(user_id),
                        Err(e) => {
                            // Left in the queue; the next cycle retries.
                            tracing::warn!(
                                coupon_id = %coupon.id,
                                user_id = %user_id,
                                error = %e,
                                "failed to dispatch waiting user; skipping this cycle"
                            );
                        }
                    }
                }
                if !dispatched.is_empty() {
                    tracing::info!(
                        coupon_id = %coupon.id,
                        dispatched = dispatched.len(),
                        "dispatched waiting batch"
                    );
                    self.cache.remove_waiting(coupon.id, &dispatched).await?;
                }
            }

            total_waiting += self.cache.waiting_depth(coupon.id).await?;
        }

        #[allow(clippy::cast_precision_loss)] // gauge precision is cosmetic
        metrics::gauge!("coupon_waiting_queue_depth").set(total_waiting as f64);

        Ok(())
    }

    /// Run cycles forever on the configured interval. Cycle errors are
    /// logged; the scheduler keeps going.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_cycle(Utc::now()).await {
                tracing::error!(error = %e, "dispatch cycle failed");
            }
        }
    }
}
