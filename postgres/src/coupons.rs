//! Coupon definition store.

use crate::store_err;
use chrono::{DateTime, Utc};
use coupon_domain::ports::CouponStore;
use coupon_domain::{Coupon, CouponError, CouponId, CouponType, Result};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// Postgres-backed [`CouponStore`].
#[derive(Clone)]
pub struct PgCouponStore {
    pool: PgPool,
}

impl PgCouponStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_coupon(row: &PgRow) -> Result<Coupon> {
        let coupon_type: String = row.get("coupon_type");
        let coupon_type: CouponType = coupon_type.parse()?;
        let total_quantity: i32 = row.get("total_quantity");
        let total_quantity = u32::try_from(total_quantity)
            .map_err(|_| CouponError::Store("negative total_quantity in storage".to_string()))?;
        Ok(Coupon::from_parts(
            CouponId(row.get("id")),
            row.get("name"),
            coupon_type,
            total_quantity,
            row.get("valid_from"),
            row.get("valid_until"),
            row.get("disabled"),
        ))
    }
}

impl CouponStore for PgCouponStore {
    async fn find_by_id(&self, id: CouponId) -> Result<Option<Coupon>> {
        let row = sqlx::query(
            r"
            SELECT id, name, coupon_type, total_quantity, valid_from, valid_until, disabled
            FROM coupons
            WHERE id = $1
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err("failed to load coupon"))?;

        row.as_ref().map(Self::row_to_coupon).transpose()
    }

    async fn save(&self, coupon: &Coupon) -> Result<()> {
        let total_quantity = i32::try_from(coupon.total_quantity)
            .map_err(|_| CouponError::Store("total_quantity exceeds storage range".to_string()))?;
        sqlx::query(
            r"
            INSERT INTO coupons (id, name, coupon_type, total_quantity, valid_from, valid_until, disabled)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                coupon_type = EXCLUDED.coupon_type,
                valid_from = EXCLUDED.valid_from,
                valid_until = EXCLUDED.valid_until,
                disabled = EXCLUDED.disabled
            ",
        )
        .bind(coupon.id.0)
        .bind(&coupon.name)
        .bind(coupon.coupon_type.as_str())
        .bind(total_quantity)
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(coupon.disabled)
        .execute(&self.pool)
        .await
        .map_err(store_err("failed to save coupon"))?;

        tracing::debug!(coupon_id = %coupon.id, "saved coupon");
        Ok(())
    }

    async fn find_active(&self, now: DateTime<Utc>) -> Result<Vec<Coupon>> {
        let rows = sqlx::query(
            r"
            SELECT id, name, coupon_type, total_quantity, valid_from, valid_until, disabled
            FROM coupons
            WHERE NOT disabled AND valid_from <= $1 AND valid_until >= $1
            ORDER BY valid_from
            ",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err("failed to list active coupons"))?;

        rows.iter().map(Self::row_to_coupon).collect()
    }
}
