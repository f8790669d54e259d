//! Fulfillment worker behavior: persistence, idempotency and the failure
//! half of the ack ladder.

#![allow(clippy::unwrap_used)]

use chrono::{Duration, Utc};
use coupon_domain::mocks::{
    MemoryAdmissionCache, MemoryCouponStore, MemoryFailureStore, MemoryIssuanceStore,
    MemoryLockManager,
};
use coupon_domain::ports::{AdmissionCache, CouponStore, FailureStore, IssuanceStore};
use coupon_domain::{Coupon, CouponIssueMessage, CouponType, IssuedCoupon, UserId};
use coupon_pipeline::{FulfillmentConfig, FulfillmentService};

fn active_coupon(total_quantity: u32) -> Coupon {
    let now = Utc::now();
    Coupon::new(
        "Worker fodder",
        CouponType::Chicken,
        total_quantity,
        now - Duration::hours(1),
        now + Duration::hours(1),
    )
    .unwrap()
}

struct Fixture {
    cache: MemoryAdmissionCache,
    issuances: MemoryIssuanceStore,
    failures: MemoryFailureStore,
    service: FulfillmentService<
        MemoryCouponStore,
        MemoryAdmissionCache,
        MemoryIssuanceStore,
        MemoryFailureStore,
        MemoryLockManager,
    >,
}

async fn fixture(coupon: &Coupon) -> Fixture {
    let coupons = MemoryCouponStore::new();
    coupons.save(coupon).await.unwrap();
    let cache = MemoryAdmissionCache::new();
    let issuances = MemoryIssuanceStore::new();
    let failures = MemoryFailureStore::new();
    let service = FulfillmentService::new(
        coupons,
        cache.clone(),
        issuances.clone(),
        failures.clone(),
        MemoryLockManager::new(),
        FulfillmentConfig::default(),
    );
    Fixture {
        cache,
        issuances,
        failures,
        service,
    }
}

#[tokio::test]
async fn first_issue_persists_one_row() {
    let coupon = active_coupon(10);
    let f = fixture(&coupon).await;
    let user = UserId::new();

    f.service
        .handle_message(CouponIssueMessage::first_issue(user, coupon.id))
        .await
        .unwrap();

    assert_eq!(f.issuances.issued_count(coupon.id), 1);
    assert!(f.issuances.find(user, coupon.id).await.unwrap().is_some());
}

#[tokio::test]
async fn duplicate_delivery_collapses_onto_one_row() {
    let coupon = active_coupon(10);
    let f = fixture(&coupon).await;
    let message = CouponIssueMessage::first_issue(UserId::new(), coupon.id);

    f.service.handle_message(message.clone()).await.unwrap();
    f.service.handle_message(message).await.unwrap();

    assert_eq!(f.issuances.issued_count(coupon.id), 1);
}

#[tokio::test]
async fn quantity_exhausted_discards_and_flags_sold_out() {
    let coupon = active_coupon(2);
    let f = fixture(&coupon).await;
    let now = Utc::now();

    // Fill the ledger to capacity behind the worker's back.
    for _ in 0..2 {
        let row = IssuedCoupon::new(UserId::new(), coupon.id, now);
        f.issuances.insert(&row).await.unwrap();
    }

    let latecomer = UserId::new();
    f.service
        .handle_message(CouponIssueMessage::first_issue(latecomer, coupon.id))
        .await
        .unwrap();

    assert_eq!(f.issuances.issued_count(coupon.id), 2);
    assert!(f.issuances.find(latecomer, coupon.id).await.unwrap().is_none());
    assert!(f.cache.is_sold_out(coupon.id).await.unwrap());
    // Not an infrastructure failure, so nothing was recorded for retry.
    assert_eq!(f.failures.unresolved_count(), 0);
}

#[tokio::test]
async fn last_unit_sets_the_sold_out_flag() {
    let coupon = active_coupon(1);
    let f = fixture(&coupon).await;

    f.service
        .handle_message(CouponIssueMessage::first_issue(UserId::new(), coupon.id))
        .await
        .unwrap();

    assert!(f.cache.is_sold_out(coupon.id).await.unwrap());
}

#[tokio::test]
async fn infrastructure_failure_is_recorded_and_acked() {
    let coupon = active_coupon(10);
    let f = fixture(&coupon).await;
    let user = UserId::new();

    f.issuances.fail_next_inserts(1);
    f.service
        .handle_message(CouponIssueMessage::first_issue(user, coupon.id))
        .await
        .unwrap();

    assert_eq!(f.issuances.issued_count(coupon.id), 0);
    assert_eq!(f.failures.unresolved_count(), 1);
    let recorded = &f.failures.all()[0];
    assert_eq!(recorded.user_id, user);
    assert_eq!(recorded.coupon_id, coupon.id);
    assert_eq!(recorded.retry_count, 0);
}

#[tokio::test]
async fn failed_failure_recording_forces_redelivery() {
    let coupon = active_coupon(10);
    let f = fixture(&coupon).await;

    f.issuances.fail_next_inserts(1);
    f.failures.fail_next_records(1);
    let result = f
        .service
        .handle_message(CouponIssueMessage::first_issue(UserId::new(), coupon.id))
        .await;

    assert!(result.is_err());
    assert_eq!(f.failures.unresolved_count(), 0);
}

#[tokio::test]
async fn business_error_propagates_without_a_failure_record() {
    let now = Utc::now();
    let expired = Coupon::new(
        "Closed window",
        CouponType::Pizza,
        10,
        now - Duration::hours(2),
        now - Duration::hours(1),
    )
    .unwrap();
    let f = fixture(&expired).await;

    let result = f
        .service
        .handle_message(CouponIssueMessage::first_issue(UserId::new(), expired.id))
        .await;

    let err = result.unwrap_err();
    assert!(err.is_business());
    assert_eq!(f.failures.unresolved_count(), 0);
    assert_eq!(f.issuances.issued_count(expired.id), 0);
}

#[tokio::test]
async fn reissue_resolves_its_failure_record() {
    let coupon = active_coupon(10);
    let f = fixture(&coupon).await;
    let user = UserId::new();

    let failure = f.failures.record(user, coupon.id, Utc::now()).await.unwrap();

    f.service
        .handle_message(CouponIssueMessage::reissue(user, coupon.id, failure.id))
        .await
        .unwrap();

    assert_eq!(f.issuances.issued_count(coupon.id), 1);
    assert_eq!(f.failures.unresolved_count(), 0);
}

#[tokio::test]
async fn reissue_infrastructure_failure_acks_without_a_new_record() {
    let coupon = active_coupon(10);
    let f = fixture(&coupon).await;
    let user = UserId::new();

    let failure = f.failures.record(user, coupon.id, Utc::now()).await.unwrap();

    f.issuances.fail_next_inserts(1);
    f.service
        .handle_message(CouponIssueMessage::reissue(user, coupon.id, failure.id))
        .await
        .unwrap();

    // The original record stays the single piece of durable evidence.
    assert_eq!(f.failures.all().len(), 1);
    assert_eq!(f.failures.unresolved_count(), 1);
    assert_eq!(f.issuances.issued_count(coupon.id), 0);
}

#[tokio::test]
async fn exhaustion_on_a_reissue_still_resolves_the_record() {
    let coupon = active_coupon(1);
    let f = fixture(&coupon).await;
    let user = UserId::new();

    let failure = f.failures.record(user, coupon.id, Utc::now()).await.unwrap();
    let winner = IssuedCoupon::new(UserId::new(), coupon.id, Utc::now());
    f.issuances.insert(&winner).await.unwrap();

    f.service
        .handle_message(CouponIssueMessage::reissue(user, coupon.id, failure.id))
        .await
        .unwrap();

    assert_eq!(f.issuances.issued_count(coupon.id), 1);
    assert_eq!(f.failures.unresolved_count(), 0);
}
