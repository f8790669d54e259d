//! Admission gate and issue strategy behavior, driven by the in-memory
//! mocks.

#![allow(clippy::unwrap_used)]

use chrono::{Duration, Utc};
use coupon_domain::mocks::{
    MemoryAdmissionCache, MemoryCouponStore, MemoryLockManager, MemoryPublisher,
};
use coupon_domain::ports::{AdmissionCache, CouponStore};
use coupon_domain::{
    Coupon, CouponError, CouponType, IssueRequestResult, UserId, TOPIC_COUPON_ISSUE,
};
use coupon_pipeline::{
    AdmissionConfig, AdmissionGate, DirectIssueService, IssueStrategy, QueuedIssueService,
};

fn active_coupon(total_quantity: u32) -> Coupon {
    let now = Utc::now();
    Coupon::new(
        "First come first served",
        CouponType::Chicken,
        total_quantity,
        now - Duration::hours(1),
        now + Duration::hours(1),
    )
    .unwrap()
}

async fn queued_fixture(
    coupon: &Coupon,
) -> (
    MemoryAdmissionCache,
    QueuedIssueService<MemoryAdmissionCache, MemoryCouponStore>,
) {
    let cache = MemoryAdmissionCache::new();
    let coupons = MemoryCouponStore::new();
    coupons.save(coupon).await.unwrap();
    let gate = AdmissionGate::new(cache.clone(), coupons, AdmissionConfig::default());
    (cache, QueuedIssueService::new(gate))
}

#[tokio::test]
async fn quantity_one_two_users_one_winner() {
    let coupon = active_coupon(1);
    let (_, service) = queued_fixture(&coupon).await;
    let now = Utc::now();
    let (alice, bob) = (UserId::new(), UserId::new());

    let (first, second) = tokio::join!(
        service.issue(alice, coupon.id, now),
        service.issue(bob, coupon.id, now),
    );
    let mut outcomes = vec![first.unwrap(), second.unwrap()];
    outcomes.sort_by_key(|o| *o == IssueRequestResult::SoldOut);

    assert_eq!(
        outcomes,
        vec![IssueRequestResult::Success, IssueRequestResult::SoldOut]
    );
}

#[tokio::test]
async fn same_user_twice_is_a_duplicate() {
    let coupon = active_coupon(10);
    let (_, service) = queued_fixture(&coupon).await;
    let now = Utc::now();
    let user = UserId::new();

    assert_eq!(
        service.issue(user, coupon.id, now).await.unwrap(),
        IssueRequestResult::Success
    );
    assert_eq!(
        service.issue(user, coupon.id, now).await.unwrap(),
        IssueRequestResult::Duplicate
    );
}

#[tokio::test]
async fn sold_out_rejection_rolls_back_dedup_and_counter() {
    let coupon = active_coupon(1);
    let (cache, service) = queued_fixture(&coupon).await;
    let now = Utc::now();
    let (winner, loser) = (UserId::new(), UserId::new());

    service.issue(winner, coupon.id, now).await.unwrap();
    assert_eq!(
        service.issue(loser, coupon.id, now).await.unwrap(),
        IssueRequestResult::SoldOut
    );

    // The losing user must not be permanently blocked by leftover state.
    assert!(!cache.is_deduped(coupon.id, loser));
    assert_eq!(cache.entry_count(coupon.id), 1);
}

#[tokio::test]
async fn burst_admits_exactly_the_quantity() {
    let coupon = active_coupon(100);
    let (cache, service) = queued_fixture(&coupon).await;
    let now = Utc::now();

    let mut handles = Vec::new();
    for _ in 0..1_000 {
        let service = service.clone();
        let coupon_id = coupon.id;
        handles.push(tokio::spawn(async move {
            service.issue(UserId::new(), coupon_id, now).await
        }));
    }

    let mut successes = 0;
    let mut sold_out = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            IssueRequestResult::Success => successes += 1,
            IssueRequestResult::SoldOut => sold_out += 1,
            IssueRequestResult::Duplicate => panic!("distinct users cannot be duplicates"),
        }
    }

    assert_eq!(successes, 100);
    assert_eq!(sold_out, 900);
    assert_eq!(cache.waiting_depth(coupon.id).await.unwrap(), 100);
}

#[tokio::test]
async fn rejected_validity_leaves_no_admission_state() {
    let now = Utc::now();
    let pending = Coupon::new(
        "Not yet open",
        CouponType::Pizza,
        5,
        now + Duration::hours(1),
        now + Duration::hours(2),
    )
    .unwrap();
    let (cache, service) = queued_fixture(&pending).await;
    let user = UserId::new();

    let result = service.issue(user, pending.id, now).await;
    assert!(matches!(result, Err(CouponError::NotIssuable { .. })));
    assert!(!cache.is_deduped(pending.id, user));
    assert_eq!(cache.entry_count(pending.id), 0);
}

#[tokio::test]
async fn sold_out_flag_short_circuits_admission() {
    let coupon = active_coupon(10);
    let (cache, service) = queued_fixture(&coupon).await;
    let now = Utc::now();
    let user = UserId::new();

    cache.mark_sold_out(coupon.id).await.unwrap();

    assert_eq!(
        service.issue(user, coupon.id, now).await.unwrap(),
        IssueRequestResult::SoldOut
    );
    assert!(!cache.is_deduped(coupon.id, user));
    assert_eq!(cache.entry_count(coupon.id), 0);
}

#[tokio::test]
async fn direct_strategy_publishes_inline() {
    let coupon = active_coupon(5);
    let cache = MemoryAdmissionCache::new();
    let coupons = MemoryCouponStore::new();
    coupons.save(&coupon).await.unwrap();
    let publisher = MemoryPublisher::new();
    let gate = AdmissionGate::new(cache, coupons, AdmissionConfig::default());
    let service = DirectIssueService::new(gate, MemoryLockManager::new(), publisher.clone());
    let user = UserId::new();

    let outcome = service.issue(user, coupon.id, Utc::now()).await.unwrap();
    assert_eq!(outcome, IssueRequestResult::Success);

    let published = publisher.messages_for(TOPIC_COUPON_ISSUE);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].user_id, user);
    assert_eq!(published[0].coupon_id, coupon.id);
    assert!(!published[0].is_reissue());
}

#[tokio::test]
async fn direct_strategy_compensates_a_failed_publish() {
    let coupon = active_coupon(5);
    let cache = MemoryAdmissionCache::new();
    let coupons = MemoryCouponStore::new();
    coupons.save(&coupon).await.unwrap();
    let publisher = MemoryPublisher::new();
    let gate = AdmissionGate::new(cache.clone(), coupons, AdmissionConfig::default());
    let service = DirectIssueService::new(gate, MemoryLockManager::new(), publisher.clone());
    let user = UserId::new();

    publisher.fail_next(1);
    let result = service.issue(user, coupon.id, Utc::now()).await;
    assert!(matches!(result, Err(CouponError::Publish { .. })));

    // Admission rolled back: the user can try again and win a slot.
    assert!(!cache.is_deduped(coupon.id, user));
    assert_eq!(cache.entry_count(coupon.id), 0);
    assert_eq!(
        service.issue(user, coupon.id, Utc::now()).await.unwrap(),
        IssueRequestResult::Success
    );
}
