//! Postgres persistence for the coupon pipeline.
//!
//! Three stores over one pool: coupon definitions, issued-coupon rows (the
//! authoritative issuance ledger, guarded by a `(user_id, coupon_id)`
//! uniqueness constraint) and failure records (claimed by the retry
//! scheduler with a compare-and-swap on `retry_count`).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod coupons;
pub mod failures;
pub mod issuances;

pub use coupons::PgCouponStore;
pub use failures::PgFailureStore;
pub use issuances::PgIssuanceStore;

use coupon_domain::{CouponError, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`CouponError::Store`] if the database is unreachable.
pub async fn connect(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| CouponError::Store(format!("failed to connect to Postgres: {e}")))
}

/// Apply pending schema migrations.
///
/// # Errors
///
/// Returns [`CouponError::Store`] if a migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| CouponError::Store(format!("failed to run migrations: {e}")))?;
    tracing::info!("database migrations applied");
    Ok(())
}

pub(crate) fn store_err(context: &str) -> impl FnOnce(sqlx::Error) -> CouponError + '_ {
    move |e| CouponError::Store(format!("{context}: {e}"))
}
