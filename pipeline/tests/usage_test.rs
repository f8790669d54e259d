//! Use-once consumption behavior.

#![allow(clippy::unwrap_used)]

use chrono::{Duration, Utc};
use coupon_domain::mocks::{MemoryCouponStore, MemoryIssuanceStore};
use coupon_domain::ports::{CouponStore, IssuanceStore};
use coupon_domain::{Coupon, CouponError, CouponId, CouponType, IssuedCoupon, UserId};
use coupon_pipeline::UsageService;

fn coupon_with_window(valid_from_hours: i64, valid_until_hours: i64) -> Coupon {
    let now = Utc::now();
    Coupon::new(
        "Dinner voucher",
        CouponType::Burger,
        10,
        now + Duration::hours(valid_from_hours),
        now + Duration::hours(valid_until_hours),
    )
    .unwrap()
}

async fn fixture(coupon: &Coupon) -> (
    MemoryIssuanceStore,
    UsageService<MemoryCouponStore, MemoryIssuanceStore>,
) {
    let coupons = MemoryCouponStore::new();
    coupons.save(coupon).await.unwrap();
    let issuances = MemoryIssuanceStore::new();
    (issuances.clone(), UsageService::new(coupons, issuances))
}

#[tokio::test]
async fn a_coupon_is_usable_exactly_once() {
    let coupon = coupon_with_window(-1, 1);
    let (issuances, service) = fixture(&coupon).await;
    let user = UserId::new();
    let now = Utc::now();
    issuances
        .insert(&IssuedCoupon::new(user, coupon.id, now))
        .await
        .unwrap();

    let used = service.use_coupon(user, coupon.id, now).await.unwrap();
    assert_eq!(used.user_id, user);

    let second = service.use_coupon(user, coupon.id, now).await;
    assert!(matches!(second, Err(CouponError::AlreadyUsed)));

    let stored = issuances.find(user, coupon.id).await.unwrap().unwrap();
    assert!(stored.used);
    assert_eq!(stored.used_at, Some(now));
}

#[tokio::test]
async fn an_issued_coupon_outside_its_window_is_not_usable() {
    let coupon = coupon_with_window(-2, -1);
    let (issuances, service) = fixture(&coupon).await;
    let user = UserId::new();
    // Issued while the window was open, presented after it closed.
    issuances
        .insert(&IssuedCoupon::new(
            user,
            coupon.id,
            Utc::now() - Duration::minutes(90),
        ))
        .await
        .unwrap();

    let result = service.use_coupon(user, coupon.id, Utc::now()).await;
    assert!(matches!(result, Err(CouponError::NotCurrentlyUsable { .. })));

    let stored = issuances.find(user, coupon.id).await.unwrap().unwrap();
    assert!(!stored.used);
}

#[tokio::test]
async fn using_without_an_issuance_is_rejected() {
    let coupon = coupon_with_window(-1, 1);
    let (_, service) = fixture(&coupon).await;

    let result = service
        .use_coupon(UserId::new(), coupon.id, Utc::now())
        .await;
    assert!(matches!(result, Err(CouponError::IssuedCouponNotFound)));
}

#[tokio::test]
async fn using_an_unknown_coupon_is_rejected() {
    let coupon = coupon_with_window(-1, 1);
    let (_, service) = fixture(&coupon).await;

    let result = service
        .use_coupon(UserId::new(), CouponId::new(), Utc::now())
        .await;
    assert!(matches!(result, Err(CouponError::CouponNotFound)));
}
