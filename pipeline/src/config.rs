//! Pipeline configuration.
//!
//! Every tunable has a production default; binaries override from the
//! environment, tests override inline with the `with_*` builders.

use std::time::Duration;

/// Admission gate and synchronous issue path configuration.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// TTL for the cached coupon snapshot.
    ///
    /// Default: 12 hours
    pub coupon_cache_ttl: Duration,

    /// Maximum wait for the coupon lock on the synchronous issue path.
    ///
    /// Default: 5 seconds
    pub lock_wait: Duration,

    /// Lease for the coupon lock on the synchronous issue path.
    ///
    /// Default: 30 seconds
    pub lock_lease: Duration,
}

impl AdmissionConfig {
    /// Set the coupon snapshot TTL.
    #[must_use]
    pub const fn with_coupon_cache_ttl(mut self, ttl: Duration) -> Self {
        self.coupon_cache_ttl = ttl;
        self
    }

    /// Set the lock wait.
    #[must_use]
    pub const fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    /// Set the lock lease.
    #[must_use]
    pub const fn with_lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease = lease;
        self
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            coupon_cache_ttl: Duration::from_secs(12 * 60 * 60),
            lock_wait: Duration::from_secs(5),
            lock_lease: Duration::from_secs(30),
        }
    }
}

/// Dispatch scheduler configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Pause between dispatch cycles.
    ///
    /// Default: 1 second
    pub interval: Duration,

    /// Maximum waiting-queue members dispatched per coupon per cycle.
    ///
    /// Default: 100
    pub batch_size: usize,
}

impl DispatchConfig {
    /// Set the cycle interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the per-coupon batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            batch_size: 100,
        }
    }
}

/// Fulfillment worker configuration.
#[derive(Debug, Clone)]
pub struct FulfillmentConfig {
    /// TTL for the cached coupon snapshot on the worker path.
    ///
    /// Default: 12 hours
    pub coupon_cache_ttl: Duration,

    /// Maximum wait for the (coupon, user) lock.
    ///
    /// Default: 5 seconds
    pub lock_wait: Duration,

    /// Lease for the (coupon, user) lock.
    ///
    /// Default: 10 seconds
    pub lock_lease: Duration,
}

impl FulfillmentConfig {
    /// Set the coupon snapshot TTL.
    #[must_use]
    pub const fn with_coupon_cache_ttl(mut self, ttl: Duration) -> Self {
        self.coupon_cache_ttl = ttl;
        self
    }

    /// Set the lock wait.
    #[must_use]
    pub const fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    /// Set the lock lease.
    #[must_use]
    pub const fn with_lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease = lease;
        self
    }
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            coupon_cache_ttl: Duration::from_secs(12 * 60 * 60),
            lock_wait: Duration::from_secs(5),
            lock_lease: Duration::from_secs(10),
        }
    }
}

/// Retry scheduler configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Pause between retry scans. Coarser than dispatch: failures are rarer
    /// and less latency-sensitive.
    ///
    /// Default: 5 minutes
    pub interval: Duration,

    /// Attempts after which a failure is left for manual intervention.
    ///
    /// Default: 3
    pub max_retry_count: u32,

    /// Maximum wait for the scan lock.
    ///
    /// Default: 5 seconds
    pub lock_wait: Duration,

    /// Lease for the scan lock.
    ///
    /// Default: 30 seconds
    pub lock_lease: Duration,
}

impl RetryConfig {
    /// Set the scan interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the maximum retry count.
    #[must_use]
    pub const fn with_max_retry_count(mut self, max: u32) -> Self {
        self.max_retry_count = max;
        self
    }

    /// Set the scan lock wait.
    #[must_use]
    pub const fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    /// Set the scan lock lease.
    #[must_use]
    pub const fn with_lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease = lease;
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            max_retry_count: 3,
            lock_wait: Duration::from_secs(5),
            lock_lease: Duration::from_secs(30),
        }
    }
}
