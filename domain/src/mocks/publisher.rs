//! In-memory message publisher.

use crate::error::{CouponError, Result};
use crate::message::CouponIssueMessage;
use crate::ports::IssuePublisher;
use std::sync::{Arc, Mutex};

fn poisoned() -> CouponError {
    CouponError::Cache("mock publisher mutex poisoned".to_string())
}

/// Records published messages instead of sending them, with publish failure
/// injection for compensation-path tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    published: Arc<Mutex<Vec<(String, CouponIssueMessage)>>>,
    fail_next: Arc<Mutex<u32>>,
}

impl MemoryPublisher {
    /// Create a publisher with an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` publishes fail with a publish error.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (test-only type).
    #[allow(clippy::unwrap_used)]
    pub fn fail_next(&self, n: u32) {
        *self.fail_next.lock().unwrap() = n;
    }

    /// Every (topic, message) pair published so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (test-only type).
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn published(&self) -> Vec<(String, CouponIssueMessage)> {
        self.published.lock().unwrap().clone()
    }

    /// Messages published to one topic, in publish order.
    #[must_use]
    pub fn messages_for(&self, topic: &str) -> Vec<CouponIssueMessage> {
        self.published()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, m)| m)
            .collect()
    }
}

impl IssuePublisher for MemoryPublisher {
    async fn publish(&self, topic: &str, message: &CouponIssueMessage) -> Result<()> {
        {
            let mut remaining = self.fail_next.lock().map_err(|_| poisoned())?;
            if *remaining > 0 {
                *remaining -= 1;
                return Err(CouponError::Publish {
                    topic: topic.to_string(),
                    reason: "injected publish failure".to_string(),
                });
            }
        }
        let mut published = self.published.lock().map_err(|_| poisoned())?;
        published.push((topic.to_string(), message.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::coupon::{CouponId, UserId};
    use crate::message::TOPIC_COUPON_ISSUE;

    #[tokio::test]
    async fn failure_injection_arms_for_exactly_n_publishes() {
        let publisher = MemoryPublisher::new();
        let message = CouponIssueMessage::first_issue(UserId::new(), CouponId::new());

        publisher.fail_next(1);
        assert!(matches!(
            publisher.publish(TOPIC_COUPON_ISSUE, &message).await,
            Err(CouponError::Publish { .. })
        ));
        publisher.publish(TOPIC_COUPON_ISSUE, &message).await.unwrap();
        assert_eq!(publisher.messages_for(TOPIC_COUPON_ISSUE).len(), 1);
    }
}
