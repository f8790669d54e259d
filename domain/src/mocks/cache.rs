//! In-memory admission cache.

use crate::coupon::{Coupon, CouponId, UserId};
use crate::error::{CouponError, Result};
use crate::ports::AdmissionCache;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn poisoned() -> CouponError {
    CouponError::Cache("mock cache mutex poisoned".to_string())
}

#[derive(Debug, Default)]
struct Inner {
    snapshots: HashMap<CouponId, Coupon>,
    dedup: HashMap<CouponId, HashSet<UserId>>,
    counters: HashMap<CouponId, u64>,
    // Waiting queues keep (score, user); arrival-ordered on read.
    waiting: HashMap<CouponId, Vec<(i64, UserId)>>,
    sold_out: HashSet<CouponId>,
    fail_next: u32,
}

/// In-memory admission cache with the same atomic-mutation semantics as the
/// Redis implementation. TTLs are accepted and ignored.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdmissionCache {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryAdmissionCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` cache operations fail with a cache error.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (test-only type).
    #[allow(clippy::unwrap_used)]
    pub fn fail_next(&self, n: u32) {
        self.inner.lock().unwrap().fail_next = n;
    }

    /// Current entry counter value, for assertions.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (test-only type).
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn entry_count(&self, coupon_id: CouponId) -> u64 {
        self.inner
            .lock()
            .unwrap()
            .counters
            .get(&coupon_id)
            .copied()
            .unwrap_or(0)
    }

    /// Whether the user is currently in the dedup set, for assertions.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (test-only type).
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn is_deduped(&self, coupon_id: CouponId, user_id: UserId) -> bool {
        self.inner
            .lock()
            .unwrap()
            .dedup
            .get(&coupon_id)
            .is_some_and(|set| set.contains(&user_id))
    }

    fn guard(inner: &mut Inner) -> Result<()> {
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(CouponError::Cache("injected cache failure".to_string()));
        }
        Ok(())
    }
}

impl AdmissionCache for MemoryAdmissionCache {
    async fn cached_coupon(&self, id: CouponId) -> Result<Option<Coupon>> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        Self::guard(&mut inner)?;
        Ok(inner.snapshots.get(&id).cloned())
    }

    async fn cache_coupon(&self, coupon: &Coupon, _ttl: Duration) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        Self::guard(&mut inner)?;
        inner.snapshots.insert(coupon.id, coupon.clone());
        Ok(())
    }

    async fn add_dedup(&self, coupon_id: CouponId, user_id: UserId) -> Result<bool> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        Self::guard(&mut inner)?;
        Ok(inner.dedup.entry(coupon_id).or_default().insert(user_id))
    }

    async fn remove_dedup(&self, coupon_id: CouponId, user_id: UserId) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        Self::guard(&mut inner)?;
        if let Some(set) = inner.dedup.get_mut(&coupon_id) {
            set.remove(&user_id);
        }
        Ok(())
    }

    async fn increment_entry(&self, coupon_id: CouponId) -> Result<u64> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        Self::guard(&mut inner)?;
        let counter = inner.counters.entry(coupon_id).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn decrement_entry(&self, coupon_id: CouponId) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        Self::guard(&mut inner)?;
        let counter = inner.counters.entry(coupon_id).or_insert(0);
        *counter = counter.saturating_sub(1);
        Ok(())
    }

    async fn push_waiting(
        &self,
        coupon_id: CouponId,
        user_id: UserId,
        arrived_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        Self::guard(&mut inner)?;
        let queue = inner.waiting.entry(coupon_id).or_default();
        if queue.iter().any(|(_, u)| *u == user_id) {
            return Ok(false);
        }
        let score = arrived_at.timestamp_micros();
        queue.push((score, user_id));
        Ok(true)
    }

    async fn waiting_batch(&self, coupon_id: CouponId, limit: usize) -> Result<Vec<UserId>> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        Self::guard(&mut inner)?;
        let mut queue = inner.waiting.get(&coupon_id).cloned().unwrap_or_default();
        queue.sort_by_key(|(score, _)| *score);
        Ok(queue.into_iter().take(limit).map(|(_, u)| u).collect())
    }

    async fn remove_waiting(&self, coupon_id: CouponId, user_ids: &[UserId]) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        Self::guard(&mut inner)?;
        if let Some(queue) = inner.waiting.get_mut(&coupon_id) {
            queue.retain(|(_, u)| !user_ids.contains(u));
        }
        Ok(())
    }

    async fn waiting_depth(&self, coupon_id: CouponId) -> Result<u64> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        Self::guard(&mut inner)?;
        Ok(inner.waiting.get(&coupon_id).map_or(0, |q| q.len() as u64))
    }

    async fn is_sold_out(&self, coupon_id: CouponId) -> Result<bool> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        Self::guard(&mut inner)?;
        Ok(inner.sold_out.contains(&coupon_id))
    }

    async fn mark_sold_out(&self, coupon_id: CouponId) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        Self::guard(&mut inner)?;
        inner.sold_out.insert(coupon_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn dedup_add_is_first_writer_wins() {
        let cache = MemoryAdmissionCache::new();
        let (coupon, user) = (CouponId::new(), UserId::new());

        assert!(cache.add_dedup(coupon, user).await.unwrap());
        assert!(!cache.add_dedup(coupon, user).await.unwrap());

        cache.remove_dedup(coupon, user).await.unwrap();
        assert!(cache.add_dedup(coupon, user).await.unwrap());
    }

    #[tokio::test]
    async fn waiting_batch_is_arrival_ordered_and_non_destructive() {
        let cache = MemoryAdmissionCache::new();
        let coupon = CouponId::new();
        let (early, late) = (UserId::new(), UserId::new());
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::seconds(1);

        // Insert out of arrival order.
        assert!(cache.push_waiting(coupon, late, t1).await.unwrap());
        assert!(cache.push_waiting(coupon, early, t0).await.unwrap());
        // Re-queueing never moves a user forward.
        assert!(!cache.push_waiting(coupon, late, t0).await.unwrap());

        assert_eq!(cache.waiting_batch(coupon, 10).await.unwrap(), vec![early, late]);
        assert_eq!(cache.waiting_depth(coupon).await.unwrap(), 2);

        cache.remove_waiting(coupon, &[early]).await.unwrap();
        assert_eq!(cache.waiting_batch(coupon, 10).await.unwrap(), vec![late]);
    }
}
