//! In-memory durable stores.

use crate::coupon::{Coupon, CouponId, CouponStatus, UserId};
use crate::error::{CouponError, Result};
use crate::failure::{FailedIssuedCoupon, FailureId};
use crate::issued::{IssuedCoupon, IssuedCouponId};
use crate::ports::{CouponStore, FailureStore, InsertOutcome, IssuanceStore};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

fn poisoned() -> CouponError {
    CouponError::Store("mock store mutex poisoned".to_string())
}

/// In-memory coupon store.
#[derive(Debug, Clone, Default)]
pub struct MemoryCouponStore {
    coupons: Arc<Mutex<HashMap<CouponId, Coupon>>>,
}

impl MemoryCouponStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CouponStore for MemoryCouponStore {
    async fn find_by_id(&self, id: CouponId) -> Result<Option<Coupon>> {
        let coupons = self.coupons.lock().map_err(|_| poisoned())?;
        Ok(coupons.get(&id).cloned())
    }

    async fn save(&self, coupon: &Coupon) -> Result<()> {
        let mut coupons = self.coupons.lock().map_err(|_| poisoned())?;
        coupons.insert(coupon.id, coupon.clone());
        Ok(())
    }

    async fn find_active(&self, now: DateTime<Utc>) -> Result<Vec<Coupon>> {
        let coupons = self.coupons.lock().map_err(|_| poisoned())?;
        Ok(coupons
            .values()
            .filter(|c| c.status(now) == CouponStatus::Active)
            .cloned()
            .collect())
    }
}

/// In-memory issuance store enforcing the (user, coupon) uniqueness
/// constraint, with insert failure injection.
#[derive(Debug, Clone, Default)]
pub struct MemoryIssuanceStore {
    rows: Arc<Mutex<HashMap<IssuedCouponId, IssuedCoupon>>>,
    fail_next_inserts: Arc<Mutex<u32>>,
}

impl MemoryIssuanceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` insert attempts fail with a store error.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (test-only type).
    #[allow(clippy::unwrap_used)]
    pub fn fail_next_inserts(&self, n: u32) {
        *self.fail_next_inserts.lock().unwrap() = n;
    }

    /// Number of rows for one coupon (test assertion helper).
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (test-only type).
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn issued_count(&self, coupon_id: CouponId) -> usize {
        self.rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.coupon_id == coupon_id)
            .count()
    }
}

impl IssuanceStore for MemoryIssuanceStore {
    async fn insert(&self, issued: &IssuedCoupon) -> Result<InsertOutcome> {
        {
            let mut remaining = self.fail_next_inserts.lock().map_err(|_| poisoned())?;
            if *remaining > 0 {
                *remaining -= 1;
                return Err(CouponError::Store("injected insert failure".to_string()));
            }
        }
        let mut rows = self.rows.lock().map_err(|_| poisoned())?;
        let duplicate = rows
            .values()
            .any(|r| r.user_id == issued.user_id && r.coupon_id == issued.coupon_id);
        if duplicate {
            return Ok(InsertOutcome::AlreadyIssued);
        }
        rows.insert(issued.id, issued.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn find(&self, user_id: UserId, coupon_id: CouponId) -> Result<Option<IssuedCoupon>> {
        let rows = self.rows.lock().map_err(|_| poisoned())?;
        Ok(rows
            .values()
            .find(|r| r.user_id == user_id && r.coupon_id == coupon_id)
            .cloned())
    }

    async fn mark_used(&self, id: IssuedCouponId, used_at: DateTime<Utc>) -> Result<()> {
        let mut rows = self.rows.lock().map_err(|_| poisoned())?;
        let row = rows
            .get_mut(&id)
            .ok_or(CouponError::IssuedCouponNotFound)?;
        row.used = true;
        row.used_at = Some(used_at);
        Ok(())
    }

    async fn count_by_coupon(&self, coupon_id: CouponId) -> Result<u64> {
        let rows = self.rows.lock().map_err(|_| poisoned())?;
        Ok(rows.values().filter(|r| r.coupon_id == coupon_id).count() as u64)
    }
}

/// In-memory failure store with record failure injection (for the
/// catastrophic "failure-recording itself fails" path).
#[derive(Debug, Clone, Default)]
pub struct MemoryFailureStore {
    rows: Arc<Mutex<HashMap<FailureId, FailedIssuedCoupon>>>,
    fail_next_records: Arc<Mutex<u32>>,
}

impl MemoryFailureStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` record attempts fail with a store error.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (test-only type).
    #[allow(clippy::unwrap_used)]
    pub fn fail_next_records(&self, n: u32) {
        *self.fail_next_records.lock().unwrap() = n;
    }

    /// All rows, for assertions.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (test-only type).
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn all(&self) -> Vec<FailedIssuedCoupon> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    /// Number of unresolved rows, for assertions.
    #[must_use]
    pub fn unresolved_count(&self) -> usize {
        self.all().iter().filter(|f| !f.resolved).count()
    }
}

impl FailureStore for MemoryFailureStore {
    async fn record(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
        failed_at: DateTime<Utc>,
    ) -> Result<FailedIssuedCoupon> {
        {
            let mut remaining = self.fail_next_records.lock().map_err(|_| poisoned())?;
            if *remaining > 0 {
                *remaining -= 1;
                return Err(CouponError::Store("injected record failure".to_string()));
            }
        }
        let failure = FailedIssuedCoupon::new(user_id, coupon_id, failed_at);
        let mut rows = self.rows.lock().map_err(|_| poisoned())?;
        rows.insert(failure.id, failure.clone());
        Ok(failure)
    }

    async fn find_retryable(&self, max_retry_count: u32) -> Result<Vec<FailedIssuedCoupon>> {
        let rows = self.rows.lock().map_err(|_| poisoned())?;
        Ok(rows
            .values()
            .filter(|f| !f.resolved && f.retry_count < max_retry_count)
            .cloned()
            .collect())
    }

    async fn claim_attempt(&self, id: FailureId, expected_retry_count: u32) -> Result<bool> {
        let mut rows = self.rows.lock().map_err(|_| poisoned())?;
        match rows.get_mut(&id) {
            Some(f) if !f.resolved && f.retry_count == expected_retry_count => {
                f.increase_retry_count();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_resolved(&self, id: FailureId) -> Result<()> {
        let mut rows = self.rows.lock().map_err(|_| poisoned())?;
        let f = rows.get_mut(&id).ok_or(CouponError::FailureRecordNotFound)?;
        f.mark_resolved();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn insert_is_idempotent_per_user_coupon_pair() {
        let store = MemoryIssuanceStore::new();
        let (user, coupon) = (UserId::new(), CouponId::new());

        let first = IssuedCoupon::new(user, coupon, Utc::now());
        assert_eq!(store.insert(&first).await.unwrap(), InsertOutcome::Inserted);

        let second = IssuedCoupon::new(user, coupon, Utc::now());
        assert_eq!(
            store.insert(&second).await.unwrap(),
            InsertOutcome::AlreadyIssued
        );
        assert_eq!(store.count_by_coupon(coupon).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn claim_attempt_is_a_compare_and_swap() {
        let store = MemoryFailureStore::new();
        let failure = store
            .record(UserId::new(), CouponId::new(), Utc::now())
            .await
            .unwrap();

        // First claim at the observed count wins and bumps the count.
        assert!(store.claim_attempt(failure.id, 0).await.unwrap());
        // A racer that observed the same count loses.
        assert!(!store.claim_attempt(failure.id, 0).await.unwrap());
        // A claim at the new count wins again.
        assert!(store.claim_attempt(failure.id, 1).await.unwrap());

        store.mark_resolved(failure.id).await.unwrap();
        assert!(!store.claim_attempt(failure.id, 2).await.unwrap());
    }
}
