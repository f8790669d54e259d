//! The two issuance strategies.
//!
//! Both share the admission gate; they differ in how an admitted request
//! reaches the fulfillment queue. The direct strategy publishes inline under
//! a coupon lock (lower latency, higher lock contention); the queued
//! strategy parks the request in the waiting queue for the dispatch
//! scheduler (higher latency, no request-path lock).

use crate::admission::AdmissionGate;
use chrono::{DateTime, Utc};
use coupon_domain::ports::{
    coupon_lock_key, AdmissionCache, CouponStore, IssuePublisher, LockManager, LockSpec,
};
use coupon_domain::{
    CouponId, CouponIssueMessage, IssueRequestResult, Result, UserId, TOPIC_COUPON_ISSUE,
};
use std::future::Future;

/// One coupon issuance request, end to end on the request side.
pub trait IssueStrategy: Send + Sync {
    /// Decide admission and hand the request off for fulfillment.
    ///
    /// # Errors
    ///
    /// Business validation errors, lock timeouts and infrastructure errors
    /// propagate; duplicate and sold-out are values.
    fn issue(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<IssueRequestResult>> + Send;
}

/// Lock-guarded synchronous strategy: admitted requests are published to the
/// fulfillment topic before the call returns.
#[derive(Clone)]
pub struct DirectIssueService<C, S, L, P> {
    gate: AdmissionGate<C, S>,
    locks: L,
    publisher: P,
}

impl<C, S, L, P> DirectIssueService<C, S, L, P>
where
    C: AdmissionCache,
    S: CouponStore,
    L: LockManager,
    P: IssuePublisher,
{
    /// Wire the strategy.
    pub const fn new(gate: AdmissionGate<C, S>, locks: L, publisher: P) -> Self {
        Self {
            gate,
            locks,
            publisher,
        }
    }
}

impl<C, S, L, P> IssueStrategy for DirectIssueService<C, S, L, P>
where
    C: AdmissionCache + Sync,
    S: CouponStore + Sync,
    L: LockManager,
    P: IssuePublisher,
{
    async fn issue(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
        now: DateTime<Utc>,
    ) -> Result<IssueRequestResult> {
        let coupon = self.gate.load_coupon(coupon_id).await?;
        let config = self.gate.config();
        let spec = LockSpec::new(
            coupon_lock_key(coupon_id),
            config.lock_wait,
            config.lock_lease,
        );

        // The cache operations inside are atomic on their own; the lock is
        // defense-in-depth that serializes a single coupon's admissions.
        let gate = &self.gate;
        let coupon_ref = &coupon;
        let outcome = self
            .locks
            .with_lock(spec, || async move {
                gate.admit(user_id, coupon_ref, now).await
            })
            .await?;

        if outcome == IssueRequestResult::Success {
            let message = CouponIssueMessage::first_issue(user_id, coupon_id);
            if let Err(publish_err) = self.publisher.publish(TOPIC_COUPON_ISSUE, &message).await {
                // The admitted slot would leak without compensation: the
                // message never reached the queue, so nobody will fulfill it.
                if let Err(rollback_err) = self.gate.rollback(coupon_id, user_id).await {
                    tracing::error!(
                        coupon_id = %coupon_id,
                        user_id = %user_id,
                        error = %rollback_err,
                        "failed to roll back admission after publish failure"
                    );
                }
                return Err(publish_err);
            }
        }

        Ok(outcome)
    }
}

/// Queue-guarded asynchronous strategy: admitted requests wait in the
/// arrival-ordered queue until the dispatch scheduler publishes them.
#[derive(Clone)]
pub struct QueuedIssueService<C, S> {
    gate: AdmissionGate<C, S>,
}

impl<C, S> QueuedIssueService<C, S>
where
    C: AdmissionCache,
    S: CouponStore,
{
    /// Wire the strategy.
    pub const fn new(gate: AdmissionGate<C, S>) -> Self {
        Self { gate }
    }
}

impl<C, S> IssueStrategy for QueuedIssueService<C, S>
where
    C: AdmissionCache + Sync,
    S: CouponStore + Sync,
{
    async fn issue(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
        now: DateTime<Utc>,
    ) -> Result<IssueRequestResult> {
        let coupon = self.gate.load_coupon(coupon_id).await?;
        let outcome = self.gate.admit(user_id, &coupon, now).await?;

        if outcome == IssueRequestResult::Success {
            match self.gate.cache().push_waiting(coupon_id, user_id, now).await {
                Ok(true) => {}
                Ok(false) => {
                    // Dedup admitted this user, so a pre-existing queue entry
                    // means the structures drifted. The earlier entry wins.
                    tracing::warn!(
                        coupon_id = %coupon_id,
                        user_id = %user_id,
                        "admitted user already present in waiting queue"
                    );
                }
                Err(queue_err) => {
                    if let Err(rollback_err) = self.gate.rollback(coupon_id, user_id).await {
                        tracing::error!(
                            coupon_id = %coupon_id,
                            user_id = %user_id,
                            error = %rollback_err,
                            "failed to roll back admission after queue failure"
                        );
                    }
                    return Err(queue_err);
                }
            }
        }

        Ok(outcome)
    }
}
