//! Named, leased, auto-extending distributed mutual exclusion.

use crate::coupon::{CouponId, UserId};
use crate::error::Result;
use std::future::Future;
use std::time::Duration;

/// Lock key serializing one coupon's conflicting operations.
#[must_use]
pub fn coupon_lock_key(coupon_id: CouponId) -> String {
    format!("coupon:{coupon_id}")
}

/// Lock key serializing one user's operations on one coupon.
#[must_use]
pub fn coupon_user_lock_key(coupon_id: CouponId, user_id: UserId) -> String {
    format!("coupon:{coupon_id}:user:{user_id}")
}

/// Lock key giving one retry scheduler instance ownership of a scan cycle.
#[must_use]
pub fn retry_scan_lock_key() -> String {
    "coupon:retry-scan".to_string()
}

/// Parameters of one lock acquisition.
///
/// The lease bounds worst-case staleness if the holder crashes outright;
/// while the holder is alive a watchdog keeps extending it, so a slow
/// critical section does not lose the lock mid-flight.
#[derive(Debug, Clone)]
pub struct LockSpec {
    /// Derived lock key (see the builder functions in this module). The key
    /// builders are plain typed functions, so derivation cannot fail at
    /// runtime.
    pub key: String,
    /// Maximum time to wait for acquisition before giving up.
    pub wait: Duration,
    /// Initial lease duration; extended by the watchdog while held.
    pub lease: Duration,
}

impl LockSpec {
    /// Build a lock spec.
    pub fn new(key: impl Into<String>, wait: Duration, lease: Duration) -> Self {
        Self {
            key: key.into(),
            wait,
            lease,
        }
    }
}

/// Distributed lock manager.
pub trait LockManager: Send + Sync {
    /// Run `critical` while holding the named lock, releasing it on every
    /// exit path. Only the acquiring task releases; releasing a lease that
    /// already expired is logged and ignored, never an error.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CouponError::LockNotAcquired`] if `spec.wait`
    /// elapses first; errors from `critical` pass through unchanged.
    fn with_lock<T, F, Fut>(&self, spec: LockSpec, critical: F) -> impl Future<Output = Result<T>> + Send
    where
        T: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn lock_keys_are_deterministic() {
        let coupon = CouponId(Uuid::nil());
        let user = UserId(Uuid::max());
        assert_eq!(
            coupon_lock_key(coupon),
            "coupon:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            coupon_user_lock_key(coupon, user),
            "coupon:00000000-0000-0000-0000-000000000000:user:ffffffff-ffff-ffff-ffff-ffffffffffff"
        );
        assert_eq!(retry_scan_lock_key(), "coupon:retry-scan");
    }
}
