//! Error taxonomy for the coupon issuance pipeline.

use thiserror::Error;

/// Result type alias for coupon operations.
pub type Result<T> = std::result::Result<T, CouponError>;

/// Error taxonomy for the issuance pipeline.
///
/// The split that matters operationally is business vs. infrastructure:
/// business errors are final and must never reach the retry subsystem, while
/// infrastructure errors always leave a durable failure record before they
/// count as handled. Use [`CouponError::is_business`] to classify.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CouponError {
    // ═══════════════════════════════════════════════════════════
    // Domain validation
    // ═══════════════════════════════════════════════════════════

    /// Coupon name is blank or too long.
    #[error("Invalid coupon name: {reason}")]
    InvalidName {
        /// Why the name was rejected.
        reason: String,
    },

    /// Coupon type string did not match a known discount category.
    #[error("Invalid coupon type: {value}")]
    InvalidType {
        /// The rejected input.
        value: String,
    },

    /// Total quantity must be at least 1.
    #[error("Invalid coupon quantity: {quantity}")]
    InvalidQuantity {
        /// The rejected quantity.
        quantity: i64,
    },

    /// Validity window is reversed (`valid_from` after `valid_until`).
    #[error("Invalid coupon validity period")]
    InvalidPeriod,

    /// Coupon definition does not exist.
    #[error("Coupon not found")]
    CouponNotFound,

    /// No issuance exists for this (user, coupon) pair.
    #[error("Issued coupon not found")]
    IssuedCouponNotFound,

    /// Failure record does not exist (already resolved or never recorded).
    #[error("Failure record not found")]
    FailureRecordNotFound,

    /// Coupon is not in an issuable state right now.
    #[error("Coupon is not issuable (status: {status})")]
    NotIssuable {
        /// Computed status at the time of the check.
        status: crate::coupon::CouponStatus,
    },

    /// Coupon is not in a usable state right now.
    #[error("Coupon is not currently usable (status: {status})")]
    NotCurrentlyUsable {
        /// Computed status at the time of the check.
        status: crate::coupon::CouponStatus,
    },

    /// Issued coupon was already consumed; the used flag flips only once.
    #[error("Coupon has already been used")]
    AlreadyUsed,

    // ═══════════════════════════════════════════════════════════
    // Transient coordination
    // ═══════════════════════════════════════════════════════════

    /// Lock wait time elapsed before acquisition.
    #[error("Failed to acquire lock: {key}")]
    LockNotAcquired {
        /// The lock key that could not be acquired.
        key: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Infrastructure
    // ═══════════════════════════════════════════════════════════

    /// Admission cache (Redis) operation failed.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Durable store operation failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Message queue publish failed.
    #[error("Failed to publish to {topic}: {reason}")]
    Publish {
        /// Destination topic.
        topic: String,
        /// Broker-reported reason.
        reason: String,
    },

    /// Message payload could not be decoded.
    #[error("Failed to decode message: {0}")]
    Decode(String),
}

impl CouponError {
    /// Returns `true` if this error is a business (domain) error.
    ///
    /// Business errors will never succeed on replay, so the fulfillment
    /// worker acknowledges them without writing a failure record.
    ///
    /// # Examples
    ///
    /// ```
    /// # use coupon_domain::CouponError;
    /// assert!(CouponError::AlreadyUsed.is_business());
    /// assert!(!CouponError::Store("connection refused".into()).is_business());
    /// ```
    #[must_use]
    pub const fn is_business(&self) -> bool {
        matches!(
            self,
            Self::InvalidName { .. }
                | Self::InvalidType { .. }
                | Self::InvalidQuantity { .. }
                | Self::InvalidPeriod
                | Self::CouponNotFound
                | Self::IssuedCouponNotFound
                | Self::FailureRecordNotFound
                | Self::NotIssuable { .. }
                | Self::NotCurrentlyUsable { .. }
                | Self::AlreadyUsed
                | Self::Decode(_)
        )
    }

    /// Returns `true` if this error is an infrastructure failure that the
    /// retry subsystem should pick up.
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        !self.is_business() && !matches!(self, Self::LockNotAcquired { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_are_classified() {
        assert!(CouponError::CouponNotFound.is_business());
        assert!(CouponError::AlreadyUsed.is_business());
        assert!(CouponError::InvalidPeriod.is_business());
        assert!(!CouponError::Cache("down".into()).is_business());
        assert!(
            !CouponError::LockNotAcquired {
                key: "coupon:1".into()
            }
            .is_business()
        );
    }

    #[test]
    fn infrastructure_excludes_lock_contention() {
        assert!(CouponError::Store("down".into()).is_infrastructure());
        assert!(
            !CouponError::LockNotAcquired {
                key: "coupon:1".into()
            }
            .is_infrastructure()
        );
    }
}
