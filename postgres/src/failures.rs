//! Failure record store.

use crate::store_err;
use chrono::{DateTime, Utc};
use coupon_domain::ports::FailureStore;
use coupon_domain::{CouponError, CouponId, FailedIssuedCoupon, FailureId, Result, UserId};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// Postgres-backed [`FailureStore`].
///
/// `record` always runs on its own connection from the pool, so a failure is
/// durable the moment it returns, independent of whatever transaction just
/// collapsed around it.
#[derive(Clone)]
pub struct PgFailureStore {
    pool: PgPool,
}

impl PgFailureStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_failure(row: &PgRow) -> Result<FailedIssuedCoupon> {
        let retry_count: i32 = row.get("retry_count");
        let retry_count = u32::try_from(retry_count)
            .map_err(|_| CouponError::Store("negative retry_count in storage".to_string()))?;
        Ok(FailedIssuedCoupon {
            id: FailureId(row.get("id")),
            user_id: UserId(row.get("user_id")),
            coupon_id: CouponId(row.get("coupon_id")),
            failed_at: row.get("failed_at"),
            retry_count,
            resolved: row.get("resolved"),
        })
    }
}

impl FailureStore for PgFailureStore {
    async fn record(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
        failed_at: DateTime<Utc>,
    ) -> Result<FailedIssuedCoupon> {
        let failure = FailedIssuedCoupon::new(user_id, coupon_id, failed_at);
        sqlx::query(
            r"
            INSERT INTO failed_issued_coupons (id, user_id, coupon_id, failed_at, retry_count, resolved)
            VALUES ($1, $2, $3, $4, 0, FALSE)
            ",
        )
        .bind(failure.id.0)
        .bind(failure.user_id.0)
        .bind(failure.coupon_id.0)
        .bind(failure.failed_at)
        .execute(&self.pool)
        .await
        .map_err(store_err("failed to record issuance failure"))?;

        tracing::warn!(
            failure_id = %failure.id,
            user_id = %user_id,
            coupon_id = %coupon_id,
            "recorded issuance failure"
        );
        metrics::counter!("coupon_issue_failures_recorded").increment(1);

        Ok(failure)
    }

    async fn find_retryable(&self, max_retry_count: u32) -> Result<Vec<FailedIssuedCoupon>> {
        let max = i64::from(max_retry_count);
        let rows = sqlx::query(
            r"
            SELECT id, user_id, coupon_id, failed_at, retry_count, resolved
            FROM failed_issued_coupons
            WHERE NOT resolved AND retry_count < $1
            ORDER BY failed_at
            ",
        )
        .bind(max)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err("failed to list retryable failures"))?;

        rows.iter().map(Self::row_to_failure).collect()
    }

    async fn claim_attempt(&self, id: FailureId, expected_retry_count: u32) -> Result<bool> {
        let expected = i64::from(expected_retry_count);
        // Compare-and-swap on retry_count: of all schedulers that observed
        // the same count, exactly one wins this attempt.
        let result = sqlx::query(
            r"
            UPDATE failed_issued_coupons
            SET retry_count = retry_count + 1
            WHERE id = $1 AND NOT resolved AND retry_count = $2
            ",
        )
        .bind(id.0)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(store_err("failed to claim retry attempt"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_resolved(&self, id: FailureId) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE failed_issued_coupons
            SET resolved = TRUE
            WHERE id = $1
            ",
        )
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(store_err("failed to resolve failure record"))?;

        if result.rows_affected() == 1 {
            metrics::counter!("coupon_issue_failures_resolved").increment(1);
            Ok(())
        } else {
            Err(CouponError::FailureRecordNotFound)
        }
    }
}
