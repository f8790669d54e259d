//! In-memory lock manager.

use crate::error::{CouponError, Result};
use crate::ports::{LockManager, LockSpec};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// In-memory lock manager keyed by lock name.
///
/// Waiting honors `spec.wait`; leases never expire because an in-process
/// holder cannot crash without dropping its guard, so no watchdog is needed.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockManager {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl MemoryLockManager {
    /// Create a lock manager with no locks held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| CouponError::Cache("mock lock mutex poisoned".to_string()))?;
        Ok(Arc::clone(
            locks.entry(key.to_string()).or_default(),
        ))
    }
}

impl LockManager for MemoryLockManager {
    async fn with_lock<T, F, Fut>(&self, spec: LockSpec, critical: F) -> Result<T>
    where
        T: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let entry = self.entry(&spec.key)?;
        let guard = tokio::time::timeout(spec.wait, entry.lock())
            .await
            .map_err(|_| CouponError::LockNotAcquired {
                key: spec.key.clone(),
            })?;
        let result = critical().await;
        drop(guard);
        result
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::time::Duration;

    fn spec(key: &str, wait_ms: u64) -> LockSpec {
        LockSpec::new(key, Duration::from_millis(wait_ms), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn contended_lock_times_out_with_lock_not_acquired() {
        let manager = MemoryLockManager::new();
        let inner = manager.clone();

        let result = manager
            .with_lock(spec("coupon:hot", 10), || async move {
                // Same key from inside the critical section never acquires.
                inner
                    .with_lock(spec("coupon:hot", 10), || async { Ok(()) })
                    .await
            })
            .await;

        assert!(matches!(result, Err(CouponError::LockNotAcquired { .. })));
    }

    #[tokio::test]
    async fn lock_is_released_on_the_error_path() {
        let manager = MemoryLockManager::new();

        let first: Result<()> = manager
            .with_lock(spec("coupon:err", 10), || async {
                Err(CouponError::Store("boom".to_string()))
            })
            .await;
        assert!(first.is_err());

        // The key must be reacquirable after the failed critical section.
        let second = manager
            .with_lock(spec("coupon:err", 10), || async { Ok(42) })
            .await
            .unwrap();
        assert_eq!(second, 42);
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let manager = MemoryLockManager::new();
        let inner = manager.clone();

        let result = manager
            .with_lock(spec("coupon:a", 10), || async move {
                inner
                    .with_lock(spec("coupon:b", 10), || async { Ok(1) })
                    .await
            })
            .await
            .unwrap();
        assert_eq!(result, 1);
    }
}
