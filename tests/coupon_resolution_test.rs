//! Integration tests for local coupon resolution and coupon administration
//! against the migrated SQLite schema.

mod common;

use assert_matches::assert_matches;
use common::{at, date, fixed_coupon, percentage_coupon, TestApp};
use lovepage_api::{
    entities::coupon,
    errors::{RejectionReason, ServiceError},
    repositories::NewPartner,
    services::coupons::{DiscountSource, ResolutionOutcome},
};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};

#[tokio::test]
async fn percentage_coupon_discounts_plan_price() {
    let app = TestApp::new().await;
    let coupon = app.seed_coupon(percentage_coupon("SAVE10", dec!(10))).await;

    let outcome = app
        .factory
        .coupon_resolver()
        .resolve("SAVE10", 1990, at("2025-03-01T12:00:00Z"))
        .await
        .unwrap();

    assert_matches!(outcome, ResolutionOutcome::Accepted(discount) => {
        assert_eq!(discount.discount_cents, 199);
        assert_eq!(discount.code, "SAVE10");
        assert_eq!(discount.coupon_id(), Some(coupon.id));
        assert_matches!(discount.source, DiscountSource::Local { discount_value, .. } => {
            assert_eq!(discount_value, dec!(10));
        });
    });
}

#[tokio::test]
async fn fixed_amount_in_major_units_can_exceed_price() {
    let app = TestApp::new().await;
    app.seed_coupon(fixed_coupon("FLAT500", dec!(500))).await;

    let outcome = app
        .factory
        .coupon_resolver()
        .resolve("FLAT500", 1990, at("2025-03-01T12:00:00Z"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ResolutionOutcome::Rejected(vec![RejectionReason::DiscountExceedsPrice])
    );
}

#[tokio::test]
async fn lookup_ignores_case_and_whitespace() {
    let app = TestApp::new().await;
    app.seed_coupon(percentage_coupon("save10", dec!(10))).await;
    let resolver = app.factory.coupon_resolver();
    let now = at("2025-03-01T12:00:00Z");

    let lower = resolver.resolve("save10", 1990, now).await.unwrap();
    let upper = resolver.resolve("SAVE10", 1990, now).await.unwrap();
    let padded = resolver.resolve("  Save10 ", 1990, now).await.unwrap();

    assert_matches!(lower, ResolutionOutcome::Accepted(_));
    assert_eq!(lower, upper);
    assert_eq!(upper, padded);
}

#[tokio::test]
async fn unknown_code_defers_to_provider() {
    let app = TestApp::new().await;

    let outcome = app
        .factory
        .coupon_resolver()
        .resolve(" welcome ", 1990, at("2025-03-01T12:00:00Z"))
        .await
        .unwrap();

    assert_eq!(outcome, ResolutionOutcome::DeferToExternal("WELCOME".to_string()));
}

#[tokio::test]
async fn expired_window_is_rejected() {
    let app = TestApp::new().await;
    let mut input = percentage_coupon("SUMMER", dec!(15));
    input.start_date = Some(date(2025, 1, 1));
    input.end_date = Some(date(2025, 1, 31));
    app.seed_coupon(input).await;
    let resolver = app.factory.coupon_resolver();

    let last_moment = resolver
        .resolve("SUMMER", 1990, at("2025-01-31T23:59:59Z"))
        .await
        .unwrap();
    let after = resolver
        .resolve("SUMMER", 1990, at("2025-02-01T00:00:00Z"))
        .await
        .unwrap();

    assert_matches!(last_moment, ResolutionOutcome::Accepted(_));
    assert_eq!(
        after,
        ResolutionOutcome::Rejected(vec![RejectionReason::AfterWindow])
    );
}

#[tokio::test]
async fn resolution_is_idempotent() {
    let app = TestApp::new().await;
    app.seed_coupon(percentage_coupon("LOVE15", dec!(15))).await;
    let resolver = app.factory.coupon_resolver();
    let now = at("2025-03-01T12:00:00Z");

    let first = resolver.resolve("LOVE15", 4990, now).await.unwrap();
    let second = resolver.resolve("LOVE15", 4990, now).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn redemption_stops_at_usage_limit() {
    let app = TestApp::new().await;
    let mut input = percentage_coupon("TWICE", dec!(20));
    input.usage_limit = Some(2);
    let coupon = app.seed_coupon(input).await;
    let repo = app.factory.coupon_repository();

    assert!(repo.record_redemption(coupon.id).await.unwrap());
    assert!(repo.record_redemption(coupon.id).await.unwrap());
    assert!(!repo.record_redemption(coupon.id).await.unwrap());

    let stored = repo.find_by_id(coupon.id).await.unwrap().unwrap();
    assert_eq!(stored.used_count, 2);

    let outcome = app
        .factory
        .coupon_resolver()
        .resolve("TWICE", 1990, at("2025-03-01T12:00:00Z"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ResolutionOutcome::Rejected(vec![RejectionReason::UsageExhausted])
    );
}

#[tokio::test]
async fn redemption_refused_for_inactive_coupon() {
    let app = TestApp::new().await;
    let mut input = percentage_coupon("PAUSED", dec!(20));
    input.active = false;
    let coupon = app.seed_coupon(input).await;

    let redeemed = app
        .factory
        .coupon_repository()
        .record_redemption(coupon.id)
        .await
        .unwrap();

    assert!(!redeemed);
}

#[tokio::test]
async fn resolving_never_counts_a_use() {
    let app = TestApp::new().await;
    let coupon = app.seed_coupon(percentage_coupon("SAVE10", dec!(10))).await;
    let resolver = app.factory.coupon_resolver();

    for _ in 0..3 {
        resolver
            .resolve("SAVE10", 1990, at("2025-03-01T12:00:00Z"))
            .await
            .unwrap();
    }

    let stored = app
        .factory
        .coupon_repository()
        .find_by_id(coupon.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.used_count, 0);
}

#[tokio::test]
async fn duplicate_code_is_a_conflict() {
    let app = TestApp::new().await;
    app.seed_coupon(percentage_coupon("SAVE10", dec!(10))).await;

    let result = app
        .factory
        .coupon_repository()
        .create(percentage_coupon("save10", dec!(5)))
        .await;

    assert_matches!(result, Err(ServiceError::Conflict(_)));
}

#[tokio::test]
async fn invalid_terms_are_rejected_before_insert() {
    let app = TestApp::new().await;

    let result = app
        .factory
        .coupon_repository()
        .create(percentage_coupon("TOOMUCH", dec!(100)))
        .await;

    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn direct_writes_store_canonical_code() {
    let app = TestApp::new().await;
    let coupon = app.seed_coupon(percentage_coupon("SAVE10", dec!(10))).await;
    let db = app.factory.db_pool().as_ref();

    let mut active: coupon::ActiveModel = coupon.into();
    active.code = Set("  renamed ".to_string());
    let updated = active.update(db).await.unwrap();

    assert_eq!(updated.code, "RENAMED");
    assert!(app
        .factory
        .coupon_repository()
        .find_by_code("renamed")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn deleting_partner_keeps_its_coupons() {
    let app = TestApp::new().await;
    let partners = app.factory.partner_repository();
    let partner = partners
        .create(NewPartner {
            name: "Flower Shop".to_string(),
            contact_email: Some("hello@flowers.example".to_string()),
        })
        .await
        .unwrap();

    let mut input = percentage_coupon("FLOWERS", dec!(12));
    input.partner_id = Some(partner.id);
    let coupon = app.seed_coupon(input).await;
    assert_eq!(coupon.partner_id, Some(partner.id));

    assert!(partners.delete(partner.id).await.unwrap());
    assert!(partners.find_by_id(partner.id).await.unwrap().is_none());

    let stored = app
        .factory
        .coupon_repository()
        .find_by_code("FLOWERS")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.partner_id, None);
    assert!(!partners.delete(partner.id).await.unwrap());
}
