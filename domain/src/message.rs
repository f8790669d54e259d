//! Wire message carried on the fulfillment topics.

use crate::coupon::{CouponId, UserId};
use crate::failure::FailureId;
use serde::{Deserialize, Serialize};

/// Topic carrying first-issue fulfillment requests.
pub const TOPIC_COUPON_ISSUE: &str = "coupon-issue";

/// Topic carrying retry fulfillment requests that reference a failure record.
pub const TOPIC_COUPON_ISSUE_RETRY: &str = "coupon-issue-retry";

/// Dead-letter topic for `topic`, the terminal destination for messages that
/// exhaust the consumer's redelivery budget.
#[must_use]
pub fn dead_letter_topic(topic: &str) -> String {
    format!("{topic}.dlt")
}

/// One fulfillment request.
///
/// `failed_issued_coupon_id` is present only on retry redelivery; it tells
/// the worker to take the reissue path, which also resolves the referenced
/// failure record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponIssueMessage {
    /// Requesting user.
    pub user_id: UserId,
    /// Requested coupon.
    pub coupon_id: CouponId,
    /// Failure record to resolve, if this is a retry.
    pub failed_issued_coupon_id: Option<FailureId>,
}

impl CouponIssueMessage {
    /// Build a first-issue message.
    #[must_use]
    pub const fn first_issue(user_id: UserId, coupon_id: CouponId) -> Self {
        Self {
            user_id,
            coupon_id,
            failed_issued_coupon_id: None,
        }
    }

    /// Build a retry message referencing an unresolved failure record.
    #[must_use]
    pub const fn reissue(user_id: UserId, coupon_id: CouponId, failure_id: FailureId) -> Self {
        Self {
            user_id,
            coupon_id,
            failed_issued_coupon_id: Some(failure_id),
        }
    }

    /// Whether this message must take the reissue path.
    #[must_use]
    pub const fn is_reissue(&self) -> bool {
        self.failed_issued_coupon_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn dead_letter_topic_appends_suffix() {
        assert_eq!(dead_letter_topic(TOPIC_COUPON_ISSUE), "coupon-issue.dlt");
        assert_eq!(
            dead_letter_topic(TOPIC_COUPON_ISSUE_RETRY),
            "coupon-issue-retry.dlt"
        );
    }

    #[test]
    fn retry_reference_round_trips_as_json() {
        let message = CouponIssueMessage::reissue(UserId::new(), CouponId::new(), FailureId::new());
        let json = serde_json::to_string(&message).unwrap();
        let back: CouponIssueMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
        assert!(back.is_reissue());
    }

    #[test]
    fn first_issue_serializes_null_failure_reference() {
        let message = CouponIssueMessage::first_issue(UserId::new(), CouponId::new());
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"failed_issued_coupon_id\":null"));
    }
}
