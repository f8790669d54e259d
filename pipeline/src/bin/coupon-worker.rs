//! Coupon pipeline worker.
//!
//! Wires the Redis admission structures, the Postgres stores and the Kafka
//! transport into one process running the fulfillment consumer, the
//! dispatch scheduler and the retry scheduler.
//!
//! Environment:
//! - `DATABASE_URL` — Postgres connection string (required)
//! - `REDIS_URL` — Redis connection string (required)
//! - `KAFKA_BROKERS` — comma-separated broker list (required)
//! - `KAFKA_GROUP_ID` — consumer group (default: `coupon-workers`)
//! - `RUST_LOG` — tracing filter (default: `info`)

use anyhow::Context;
use coupon_cache::{RedisAdmissionCache, RedisLockManager};
use coupon_domain::{TOPIC_COUPON_ISSUE, TOPIC_COUPON_ISSUE_RETRY};
use coupon_kafka::{ConsumerConfig, IssueConsumer, KafkaIssueProducer};
use coupon_pipeline::{
    DispatchConfig, DispatchScheduler, FulfillmentConfig, FulfillmentService, RetryConfig,
    RetryScheduler,
};
use coupon_postgres::{PgCouponStore, PgFailureStore, PgIssuanceStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let redis_url = std::env::var("REDIS_URL").context("REDIS_URL must be set")?;
    let brokers = std::env::var("KAFKA_BROKERS").context("KAFKA_BROKERS must be set")?;
    let group_id =
        std::env::var("KAFKA_GROUP_ID").unwrap_or_else(|_| "coupon-workers".to_string());

    let pool = coupon_postgres::connect(&database_url).await?;
    coupon_postgres::run_migrations(&pool).await?;
    let coupons = PgCouponStore::new(pool.clone());
    let issuances = PgIssuanceStore::new(pool.clone());
    let failures = PgFailureStore::new(pool);

    let cache = RedisAdmissionCache::new(&redis_url).await?;
    let locks = RedisLockManager::new(&redis_url).await?;
    let producer = KafkaIssueProducer::new(&brokers)?;

    let fulfillment = FulfillmentService::new(
        coupons.clone(),
        cache.clone(),
        issuances,
        failures.clone(),
        locks.clone(),
        FulfillmentConfig::default(),
    );
    let dispatcher = DispatchScheduler::new(
        cache,
        coupons,
        producer.clone(),
        DispatchConfig::default(),
    );
    let retrier = RetryScheduler::new(failures, producer, locks, RetryConfig::default());

    let consumer = IssueConsumer::new(ConsumerConfig::new(
        brokers,
        group_id,
        vec![
            TOPIC_COUPON_ISSUE.to_string(),
            TOPIC_COUPON_ISSUE_RETRY.to_string(),
        ],
    ))?;

    tracing::info!("coupon worker started");

    tokio::select! {
        () = consumer.run(&fulfillment) => {
            tracing::warn!("consumer loop ended");
        }
        () = dispatcher.run() => {
            tracing::warn!("dispatch scheduler ended");
        }
        () = retrier.run() => {
            tracing::warn!("retry scheduler ended");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for shutdown signal")?;
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}
