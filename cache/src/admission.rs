//! Redis admission gate structures.
//!
//! Key layout per coupon:
//! - `applied_user:{coupon_id}` — dedup set (SADD / SREM)
//! - `coupon:entry_count:{coupon_id}` — entry counter (INCR / DECR)
//! - `coupon:wait_queue:{coupon_id}` — waiting queue, sorted set scored by
//!   arrival time in microseconds (ZADD NX)
//! - `coupon:sold_out:{coupon_id}` — sold-out flag with a bounded TTL
//! - `coupon:meta:{coupon_id}` — JSON coupon snapshot (cache-aside)

use chrono::{DateTime, Utc};
use coupon_domain::ports::AdmissionCache;
use coupon_domain::{Coupon, CouponError, CouponId, Result, UserId};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;

/// How long the sold-out flag outlives the moment quantity ran out. Long
/// enough to absorb the issuance burst, short enough to self-heal if the
/// flag was set spuriously.
pub const SOLD_OUT_TTL: Duration = Duration::from_secs(60 * 60);

/// Shared admission state in Redis.
#[derive(Clone)]
pub struct RedisAdmissionCache {
    conn_manager: ConnectionManager,
}

impl RedisAdmissionCache {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::Cache`] if the client cannot be created or the
    /// connection manager fails to start.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| CouponError::Cache(format!("failed to create Redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            CouponError::Cache(format!("failed to create Redis connection manager: {e}"))
        })?;
        Ok(Self { conn_manager })
    }

    fn dedup_key(coupon_id: CouponId) -> String {
        format!("applied_user:{coupon_id}")
    }

    fn entry_count_key(coupon_id: CouponId) -> String {
        format!("coupon:entry_count:{coupon_id}")
    }

    fn wait_queue_key(coupon_id: CouponId) -> String {
        format!("coupon:wait_queue:{coupon_id}")
    }

    fn sold_out_key(coupon_id: CouponId) -> String {
        format!("coupon:sold_out:{coupon_id}")
    }

    fn meta_key(coupon_id: CouponId) -> String {
        format!("coupon:meta:{coupon_id}")
    }
}

fn cache_err(context: &str) -> impl FnOnce(redis::RedisError) -> CouponError + '_ {
    move |e| CouponError::Cache(format!("{context}: {e}"))
}

impl AdmissionCache for RedisAdmissionCache {
    async fn cached_coupon(&self, id: CouponId) -> Result<Option<Coupon>> {
        let mut conn = self.conn_manager.clone();
        let raw: Option<String> = conn
            .get(Self::meta_key(id))
            .await
            .map_err(cache_err("failed to read coupon snapshot"))?;
        match raw {
            Some(json) => {
                let coupon: Coupon = serde_json::from_str(&json)
                    .map_err(|e| CouponError::Decode(format!("corrupt coupon snapshot: {e}")))?;
                Ok(Some(coupon))
            }
            None => Ok(None),
        }
    }

    async fn cache_coupon(&self, coupon: &Coupon, ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let json = serde_json::to_string(coupon)
            .map_err(|e| CouponError::Decode(format!("failed to encode coupon snapshot: {e}")))?;
        let _: () = conn
            .set_ex(Self::meta_key(coupon.id), json, ttl.as_secs())
            .await
            .map_err(cache_err("failed to write coupon snapshot"))?;
        Ok(())
    }

    async fn add_dedup(&self, coupon_id: CouponId, user_id: UserId) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let added: u64 = conn
            .sadd(Self::dedup_key(coupon_id), user_id.to_string())
            .await
            .map_err(cache_err("failed to add to dedup set"))?;
        Ok(added == 1)
    }

    async fn remove_dedup(&self, coupon_id: CouponId, user_id: UserId) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .srem(Self::dedup_key(coupon_id), user_id.to_string())
            .await
            .map_err(cache_err("failed to remove from dedup set"))?;
        Ok(())
    }

    async fn increment_entry(&self, coupon_id: CouponId) -> Result<u64> {
        let mut conn = self.conn_manager.clone();
        let count: i64 = conn
            .incr(Self::entry_count_key(coupon_id), 1)
            .await
            .map_err(cache_err("failed to increment entry counter"))?;
        #[allow(clippy::cast_sign_loss)] // INCR from zero never goes negative
        Ok(count.max(0) as u64)
    }

    async fn decrement_entry(&self, coupon_id: CouponId) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .decr(Self::entry_count_key(coupon_id), 1)
            .await
            .map_err(cache_err("failed to decrement entry counter"))?;
        Ok(())
    }

    async fn push_waiting(
        &self,
        coupon_id: CouponId,
        user_id: UserId,
        arrived_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let score = arrived_at.timestamp_micros();
        // ZADD NX: a re-queued user keeps their original arrival score.
        let added: u64 = redis::cmd("ZADD")
            .arg(Self::wait_queue_key(coupon_id))
            .arg("NX")
            .arg(score)
            .arg(user_id.to_string())
            .query_async(&mut conn)
            .await
            .map_err(cache_err("failed to push onto waiting queue"))?;
        Ok(added == 1)
    }

    async fn waiting_batch(&self, coupon_id: CouponId, limit: usize) -> Result<Vec<UserId>> {
        let mut conn = self.conn_manager.clone();
        if limit == 0 {
            return Ok(Vec::new());
        }
        let members: Vec<String> = conn
            .zrange(Self::wait_queue_key(coupon_id), 0, limit as isize - 1)
            .await
            .map_err(cache_err("failed to read waiting batch"))?;
        members
            .into_iter()
            .map(|raw| {
                raw.parse()
                    .map(UserId)
                    .map_err(|e| CouponError::Decode(format!("corrupt waiting queue member: {e}")))
            })
            .collect()
    }

    async fn remove_waiting(&self, coupon_id: CouponId, user_ids: &[UserId]) -> Result<()> {
        if user_ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn_manager.clone();
        let members: Vec<String> = user_ids.iter().map(ToString::to_string).collect();
        let _: () = conn
            .zrem(Self::wait_queue_key(coupon_id), members)
            .await
            .map_err(cache_err("failed to remove waiting queue members"))?;
        Ok(())
    }

    async fn waiting_depth(&self, coupon_id: CouponId) -> Result<u64> {
        let mut conn = self.conn_manager.clone();
        let depth: u64 = conn
            .zcard(Self::wait_queue_key(coupon_id))
            .await
            .map_err(cache_err("failed to read waiting queue depth"))?;
        Ok(depth)
    }

    async fn is_sold_out(&self, coupon_id: CouponId) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let exists: bool = conn
            .exists(Self::sold_out_key(coupon_id))
            .await
            .map_err(cache_err("failed to read sold-out flag"))?;
        Ok(exists)
    }

    async fn mark_sold_out(&self, coupon_id: CouponId) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .set_ex(Self::sold_out_key(coupon_id), 1, SOLD_OUT_TTL.as_secs())
            .await
            .map_err(cache_err("failed to set sold-out flag"))?;
        tracing::info!(coupon_id = %coupon_id, "marked coupon sold out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::TimeZone;
    use coupon_domain::CouponType;

    // Integration tests require a running Redis instance:
    // docker run -d -p 6379:6379 redis:7-alpine

    fn sample_coupon() -> Coupon {
        let from = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let until = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        Coupon::new("Lunch special".to_string(), CouponType::Pizza, 100, from, until).unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn dedup_set_reports_first_admission_only() {
        let cache = RedisAdmissionCache::new("redis://127.0.0.1:6379")
            .await
            .unwrap();
        let (coupon, user) = (CouponId::new(), UserId::new());

        assert!(cache.add_dedup(coupon, user).await.unwrap());
        assert!(!cache.add_dedup(coupon, user).await.unwrap());

        cache.remove_dedup(coupon, user).await.unwrap();
        assert!(cache.add_dedup(coupon, user).await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn waiting_queue_preserves_arrival_order() {
        let cache = RedisAdmissionCache::new("redis://127.0.0.1:6379")
            .await
            .unwrap();
        let coupon = CouponId::new();
        let (early, late) = (UserId::new(), UserId::new());
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(1);

        assert!(cache.push_waiting(coupon, late, t1).await.unwrap());
        assert!(cache.push_waiting(coupon, early, t0).await.unwrap());
        // ZADD NX must not rewrite late's score.
        assert!(!cache.push_waiting(coupon, late, t0).await.unwrap());

        assert_eq!(
            cache.waiting_batch(coupon, 10).await.unwrap(),
            vec![early, late]
        );
        assert_eq!(cache.waiting_depth(coupon).await.unwrap(), 2);

        cache.remove_waiting(coupon, &[early, late]).await.unwrap();
        assert_eq!(cache.waiting_depth(coupon).await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn snapshot_round_trips_through_json() {
        let cache = RedisAdmissionCache::new("redis://127.0.0.1:6379")
            .await
            .unwrap();
        let coupon = sample_coupon();

        assert!(cache.cached_coupon(coupon.id).await.unwrap().is_none());
        cache
            .cache_coupon(&coupon, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.cached_coupon(coupon.id).await.unwrap(), Some(coupon));
    }
}
