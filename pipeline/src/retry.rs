//! The retry scheduler.
//!
//! Scans unresolved failures below the retry cap and re-publishes them on
//! the retry topic. The scan itself runs under a cluster-wide lock, and each
//! failure is claimed with a compare-and-swap on its retry count, so two
//! schedulers can never retry the same failure concurrently. The claim is
//! the attempt counter: a failed re-publish needs no extra bookkeeping
//! write, the next scan simply finds the failure still unresolved.
//!
//! A failure that reaches the cap is left unresolved for manual
//! intervention; nothing is deleted.

use crate::config::RetryConfig;
use coupon_domain::ports::{retry_scan_lock_key, FailureStore, IssuePublisher, LockManager, LockSpec};
use coupon_domain::{CouponError, CouponIssueMessage, Result, TOPIC_COUPON_ISSUE_RETRY};

/// Periodic failure re-publisher.
#[derive(Clone)]
pub struct RetryScheduler<F, P, L> {
    failures: F,
    publisher: P,
    locks: L,
    config: RetryConfig,
}

impl<F, P, L> RetryScheduler<F, P, L>
where
    F: FailureStore + Sync,
    P: IssuePublisher + Sync,
    L: LockManager,
{
    /// Wire the scheduler.
    pub const fn new(failures: F, publisher: P, locks: L, config: RetryConfig) -> Self {
        Self {
            failures,
            publisher,
            locks,
            config,
        }
    }

    /// Run one retry scan. Losing the scan lock to another instance is a
    /// no-op, not an error.
    ///
    /// # Errors
    ///
    /// Returns store errors that abort the scan.
    pub async fn run_cycle(&self) -> Result<()> {
        let spec = LockSpec::new(
            retry_scan_lock_key(),
            self.config.lock_wait,
            self.config.lock_lease,
        );
        match self
            .locks
            .with_lock(spec, || async move { self.scan().await })
            .await
        {
            Ok(()) => Ok(()),
            Err(CouponError::LockNotAcquired { .. }) => {
                tracing::debug!("another instance owns this retry scan");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn scan(&self) -> Result<()> {
        let retryable = self
            .failures
            .find_retryable(self.config.max_retry_count)
            .await?;
        if retryable.is_empty() {
            return Ok(());
        }
        tracing::info!(candidates = retryable.len(), "retry scan started");

        for failure in retryable {
            // CAS claim at the count we observed. A zero-row update means a
            // racing scheduler owns this attempt.
            if !self
                .failures
                .claim_attempt(failure.id, failure.retry_count)
                .await?
            {
                tracing::debug!(failure_id = %failure.id, "retry attempt claimed elsewhere");
                continue;
            }

            let message =
                CouponIssueMessage::reissue(failure.user_id, failure.coupon_id, failure.id);
            match self
                .publisher
                .publish(TOPIC_COUPON_ISSUE_RETRY, &message)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        failure_id = %failure.id,
                        attempt = failure.retry_count + 1,
                        max_retry_count = self.config.max_retry_count,
                        "failure re-published for reissue"
                    );
                }
                Err(e) => {
                    // The claim already counted this attempt; the next scan
                    // picks the failure up again if attempts remain.
                    tracing::warn!(
                        failure_id = %failure.id,
                        error = %e,
                        "failed to re-publish failure"
                    );
                }
            }
        }

        Ok(())
    }

    /// Run scans forever on the configured interval. Scan errors are
    /// logged; the scheduler keeps going.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_cycle().await {
                tracing::error!(error = %e, "retry cycle failed");
            }
        }
    }
}
