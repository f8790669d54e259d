//! Redis distributed lock manager.
//!
//! Each lock is a `LOCK:{name}` key holding a random owner token, written
//! with `SET NX PX`. While the critical section runs, a watchdog task keeps
//! extending the lease, so a slow holder never loses the lock mid-flight;
//! the lease only expires if the holder's process dies outright. Release
//! and extension are compare-owner Lua scripts, so a lock can never be
//! released or extended by anyone but its holder.

use coupon_domain::ports::{LockManager, LockSpec};
use coupon_domain::{CouponError, Result};
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// The watchdog extends the lease every `lease / WATCHDOG_DIVISOR`.
pub const WATCHDOG_DIVISOR: u32 = 3;

/// Pause between acquisition attempts while waiting for a contended lock.
const ACQUIRE_RETRY: Duration = Duration::from_millis(50);

const RELEASE_SCRIPT: &str = r"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    else
        return 0
    end
";

const EXTEND_SCRIPT: &str = r"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('PEXPIRE', KEYS[1], ARGV[2])
    else
        return 0
    end
";

/// Leased, watchdog-extended named locks in Redis.
#[derive(Clone)]
pub struct RedisLockManager {
    conn_manager: ConnectionManager,
}

impl RedisLockManager {
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

    fn lock_storage_key(name: &str) -> String {
        format!("LOCK:{name}")
    }

    /// Try `SET NX PX` once. Returns `true` when this call took the lock.
    async fn try_acquire(&self, key: &str, token: &str, lease: Duration) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        #[allow(clippy::cast_possible_truncation)] // leases are seconds, not centuries
        let lease_ms = lease.as_millis() as u64;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(lease_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| CouponError::Cache(format!("failed to acquire lock: {e}")))?;
        Ok(reply.is_some())
    }

    /// Release only if we still own the lease. An already-expired lease is
    /// logged, never an error.
    async fn release(&self, key: &str, token: &str) {
        let mut conn = self.conn_manager.clone();
        let released: std::result::Result<u64, _> = Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await;
        match released {
            Ok(1) => {}
            Ok(_) => {
                tracing::warn!(key = %key, "lock lease already expired before release");
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to release lock");
            }
        }
    }

    fn spawn_watchdog(
        &self,
        key: String,
        token: String,
        lease: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let mut conn = self.conn_manager.clone();
        tokio::spawn(async move {
            #[allow(clippy::cast_possible_truncation)]
            let lease_ms = lease.as_millis() as u64;
            let mut ticker = tokio::time::interval(lease / WATCHDOG_DIVISOR);
            // The first tick fires immediately; skip it so the first
            // extension happens a third of a lease in.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let extended: std::result::Result<u64, _> = Script::new(EXTEND_SCRIPT)
                    .key(&key)
                    .arg(&token)
                    .arg(lease_ms)
                    .invoke_async(&mut conn)
                    .await;
                match extended {
                    Ok(1) => {
                        tracing::trace!(key = %key, "extended lock lease");
                    }
                    Ok(_) => {
                        tracing::warn!(key = %key, "lock lease lost; stopping watchdog");
                        return;
                    }
                    Err(e) => {
                        // Transient extension failures are survivable while
                        // the lease has time left; keep trying.
                        tracing::warn!(key = %key, error = %e, "failed to extend lock lease");
                    }
                }
            }
        })
    }
}

impl LockManager for RedisLockManager {
    async fn with_lock<T, F, Fut>(&self, spec: LockSpec, critical: F) -> Result<T>
    where
        T: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let key = Self::lock_storage_key(&spec.key);
        let token = uuid::Uuid::new_v4().to_string();
        let deadline = Instant::now() + spec.wait;

        loop {
            if self.try_acquire(&key, &token, spec.lease).await? {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::debug!(key = %spec.key, wait = ?spec.wait, "lock wait elapsed");
                return Err(CouponError::LockNotAcquired {
                    key: spec.key.clone(),
                });
            }
            tokio::time::sleep(ACQUIRE_RETRY.min(deadline - now)).await;
        }

        let watchdog = self.spawn_watchdog(key.clone(), token.clone(), spec.lease);
        let result = critical().await;
        watchdog.abort();
        self.release(&key, &token).await;
        result
    }
}
