//! The authoritative issuance ledger.

use crate::store_err;
use chrono::{DateTime, Utc};
use coupon_domain::ports::{InsertOutcome, IssuanceStore};
use coupon_domain::{CouponError, CouponId, IssuedCoupon, IssuedCouponId, Result, UserId};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// Postgres-backed [`IssuanceStore`].
///
/// The `(user_id, coupon_id)` uniqueness constraint makes [`insert`]
/// idempotent: duplicate fulfillment attempts, however they arise, collapse
/// into the one existing row instead of over-issuing.
///
/// [`insert`]: IssuanceStore::insert
#[derive(Clone)]
pub struct PgIssuanceStore {
    pool: PgPool,
}

impl PgIssuanceStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_issued(row: &PgRow) -> IssuedCoupon {
        IssuedCoupon {
            id: IssuedCouponId(row.get("id")),
            user_id: UserId(row.get("user_id")),
            coupon_id: CouponId(row.get("coupon_id")),
            used: row.get("used"),
            issued_at: row.get("issued_at"),
            used_at: row.get("used_at"),
        }
    }
}

impl IssuanceStore for PgIssuanceStore {
    async fn insert(&self, issued: &IssuedCoupon) -> Result<InsertOutcome> {
        let result = sqlx::query(
            r"
            INSERT INTO issued_coupons (id, user_id, coupon_id, used, issued_at, used_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, coupon_id) DO NOTHING
            ",
        )
        .bind(issued.id.0)
        .bind(issued.user_id.0)
        .bind(issued.coupon_id.0)
        .bind(issued.used)
        .bind(issued.issued_at)
        .bind(issued.used_at)
        .execute(&self.pool)
        .await
        .map_err(store_err("failed to insert issued coupon"))?;

        if result.rows_affected() == 1 {
            tracing::debug!(
                user_id = %issued.user_id,
                coupon_id = %issued.coupon_id,
                "issued coupon persisted"
            );
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::AlreadyIssued)
        }
    }

    async fn find(&self, user_id: UserId, coupon_id: CouponId) -> Result<Option<IssuedCoupon>> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, coupon_id, used, issued_at, used_at
            FROM issued_coupons
            WHERE user_id = $1 AND coupon_id = $2
            ",
        )
        .bind(user_id.0)
        .bind(coupon_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err("failed to load issued coupon"))?;

        Ok(row.as_ref().map(Self::row_to_issued))
    }

    async fn mark_used(&self, id: IssuedCouponId, used_at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE issued_coupons
            SET used = TRUE, used_at = $2
            WHERE id = $1 AND NOT used
            ",
        )
        .bind(id.0)
        .bind(used_at)
        .execute(&self.pool)
        .await
        .map_err(store_err("failed to mark issued coupon used"))?;

        if result.rows_affected() == 1 {
            Ok(())
        } else {
            // Row missing or already used; distinguish for the caller.
            let exists: Option<bool> =
                sqlx::query_scalar("SELECT used FROM issued_coupons WHERE id = $1")
                    .bind(id.0)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(store_err("failed to check issued coupon"))?;
            match exists {
                Some(true) => Err(CouponError::AlreadyUsed),
                _ => Err(CouponError::IssuedCouponNotFound),
            }
        }
    }

    async fn count_by_coupon(&self, coupon_id: CouponId) -> Result<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM issued_coupons WHERE coupon_id = $1")
                .bind(coupon_id.0)
                .fetch_one(&self.pool)
                .await
                .map_err(store_err("failed to count issuances"))?;
        #[allow(clippy::cast_sign_loss)] // COUNT(*) is never negative
        Ok(count as u64)
    }
}
