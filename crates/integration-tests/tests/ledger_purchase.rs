//! Integration tests for the credit purchase lifecycle.
//!
//! These tests require a running `PostgreSQL` database reachable via
//! `LEDGER_DATABASE_URL`.
//!
//! Run with: cargo test -p storescribe-integration-tests -- --ignored

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;

use storescribe_core::{
    AdjustmentKind, Email, GatewayPaymentStatus, PaymentStatus, PurchaseStatus, ShopId,
};
use storescribe_integration_tests::{seed_shop, test_pool, unique_charge_id, unique_domain};
use storescribe_ledger::db::{
    NewAdjustment, PackageRepository, PromotionRepository, PurchaseRepository, ShopRepository,
};
use storescribe_ledger::error::LedgerError;
use storescribe_ledger::models::CreditPackage;
use storescribe_ledger::services::{
    CatalogService, PurchaseService, ReportingService, StandardBillingOperations,
};

const TEST_MODEL: &str = "scribe-standard-v2";

async fn small_package(pool: &PgPool) -> CreditPackage {
    CatalogService::new(pool)
        .create_standard_credit_packages()
        .await
        .expect("Seeding failed");
    CatalogService::new(pool)
        .package_by_name("SMALL")
        .await
        .expect("SMALL package missing")
}

async fn seed_staff_user(pool: &PgPool, shop_id: ShopId, email: &str) {
    let parsed = Email::parse(email).expect("test email should parse");
    ShopRepository::new(pool)
        .upsert_associated_user(shop_id, 42, Some(&parsed), Some("Ada"), Some("Staff"), true)
        .await
        .expect("Failed to seed staff user");
}

// ============================================================================
// Scenario A: end-to-end SMALL purchase
// ============================================================================

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database"]
async fn test_small_purchase_end_to_end() {
    let pool = test_pool().await;
    let domain = unique_domain();
    let shop = seed_shop(&pool, &domain).await;
    let package = small_package(&pool).await;
    let email = format!("buyer-{}@example.com", shop.id);
    seed_staff_user(&pool, shop.id, &email).await;

    let billing = StandardBillingOperations;
    let service = PurchaseService::new(&pool, &billing, None, TEST_MODEL);

    let outcome = service
        .purchase_credits_with_promotions(
            &domain,
            package.id,
            &unique_charge_id(),
            Some(&email),
        )
        .await
        .expect("Purchase failed");

    let purchase = &outcome.credit_purchase;
    assert_eq!(purchase.status, PurchaseStatus::Active);
    assert_eq!(purchase.snapshot.credit_amount, Decimal::from(100));
    assert!(purchase.associated_user_id.is_some());

    // No promotions seeded for this shop: payment is the list price.
    assert_eq!(outcome.payment.amount, Decimal::from(10));
    assert_eq!(outcome.payment.adjusted_amount, Decimal::from(10));
    assert_eq!(outcome.payment.status, PaymentStatus::Succeeded);

    let report = ReportingService::new(&pool)
        .purchase_details(&domain)
        .await
        .expect("Report failed")
        .expect("Shop should have active purchases");
    assert_eq!(report.total_credits_available, Decimal::from(100));
}

// ============================================================================
// P1: transaction atomicity
// ============================================================================

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database"]
async fn test_duplicate_charge_id_rolls_back_the_whole_graph() {
    let pool = test_pool().await;
    let domain = unique_domain();
    let shop = seed_shop(&pool, &domain).await;
    let package = small_package(&pool).await;
    let charge_id = unique_charge_id();

    let billing = StandardBillingOperations;
    let service = PurchaseService::new(&pool, &billing, None, TEST_MODEL);

    service
        .purchase_credits_with_promotions(&domain, package.id, &charge_id, None)
        .await
        .expect("First purchase failed");

    let err = service
        .purchase_credits_with_promotions(&domain, package.id, &charge_id, None)
        .await
        .expect_err("Replaying the charge id should fail");
    assert!(matches!(err, LedgerError::Conflict { .. }), "got {err:?}");

    // The failed attempt left nothing behind: one purchase, one usage,
    // one payment.
    let (purchases, usages, payments): (i64, i64, i64) = sqlx::query_as(
        r"
        SELECT
            (SELECT COUNT(*) FROM ledger.credit_purchases WHERE shop_id = $1),
            (SELECT COUNT(*) FROM ledger.usages WHERE shop_id = $1),
            (SELECT COUNT(*) FROM ledger.payments p
             JOIN ledger.credit_purchases cp ON cp.id = p.purchase_id
             WHERE cp.shop_id = $1)
        ",
    )
    .bind(shop.id)
    .fetch_one(&pool)
    .await
    .expect("Count query failed");
    assert_eq!((purchases, usages, payments), (1, 1, 1));
}

// ============================================================================
// P3: snapshot isolation from catalog edits
// ============================================================================

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database"]
async fn test_snapshot_survives_catalog_price_change() {
    let pool = test_pool().await;
    let domain = unique_domain();
    seed_shop(&pool, &domain).await;
    let package = small_package(&pool).await;
    let original_price = package.total_price;

    let billing = StandardBillingOperations;
    let service = PurchaseService::new(&pool, &billing, None, TEST_MODEL);
    let outcome = service
        .purchase_credits_with_promotions(&domain, package.id, &unique_charge_id(), None)
        .await
        .expect("Purchase failed");

    PackageRepository::new(&pool)
        .update_total_price(package.id, original_price * Decimal::from(2))
        .await
        .expect("Price update failed");

    let fetched = PurchaseRepository::new(&pool)
        .find_by_id(outcome.credit_purchase.id)
        .await
        .expect("Fetch failed")
        .expect("Purchase should exist");
    assert_eq!(fetched.snapshot.total_price, original_price);

    // Restore the catalog for other tests sharing the database.
    PackageRepository::new(&pool)
        .update_total_price(package.id, original_price)
        .await
        .expect("Price restore failed");
}

// ============================================================================
// Promotions: billing events and use counting
// ============================================================================

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database"]
async fn test_applied_promotion_is_recorded_and_counted_once() {
    let pool = test_pool().await;
    let domain = unique_domain();
    let shop = seed_shop(&pool, &domain).await;
    let package = small_package(&pool).await;

    // 20% off, scoped to this shop only so other tests are unaffected.
    let promotion = PromotionRepository::new(&pool)
        .insert_promotion(&NewAdjustment {
            code: format!("LAUNCH20-{}", shop.id),
            name: "Launch 20".to_owned(),
            kind: AdjustmentKind::Percentage,
            value: Decimal::from(20),
            shop_id: Some(shop.id),
            package_id: Some(package.id),
            starts_at: Utc::now() - chrono::Duration::hours(1),
            expires_at: None,
            max_uses: Some(5),
        })
        .await
        .expect("Promotion insert failed");

    let billing = StandardBillingOperations;
    let service = PurchaseService::new(&pool, &billing, None, TEST_MODEL);
    let outcome = service
        .purchase_credits_with_promotions(&domain, package.id, &unique_charge_id(), None)
        .await
        .expect("Purchase failed");

    // $10 less 20% = $8.
    assert_eq!(outcome.payment.amount, Decimal::from(10));
    assert_eq!(outcome.payment.adjusted_amount, Decimal::from(8));

    let (events, used_count): (i64, i64) = sqlx::query_as(
        r"
        SELECT
            (SELECT COUNT(*) FROM ledger.billing_events
             WHERE purchase_id = $1 AND promotion_id = $2),
            (SELECT used_count FROM ledger.promotions WHERE id = $2)
        ",
    )
    .bind(outcome.credit_purchase.id)
    .bind(promotion.id)
    .fetch_one(&pool)
    .await
    .expect("Audit query failed");
    assert_eq!(events, 1);
    assert_eq!(used_count, 1);
}

// ============================================================================
// P5: gateway status mapping
// ============================================================================

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database"]
async fn test_gateway_status_drives_purchase_status() {
    let pool = test_pool().await;
    let package_cases = [
        (GatewayPaymentStatus::Failed, PurchaseStatus::Frozen),
        (GatewayPaymentStatus::Cancelled, PurchaseStatus::Cancelled),
        (GatewayPaymentStatus::Succeeded, PurchaseStatus::Active),
        (
            GatewayPaymentStatus::Other("ON_HOLD".to_owned()),
            PurchaseStatus::PastDue,
        ),
    ];

    let billing = StandardBillingOperations;
    let service = PurchaseService::new(&pool, &billing, None, TEST_MODEL);

    for (gateway_status, expected) in package_cases {
        let domain = unique_domain();
        seed_shop(&pool, &domain).await;
        let package = small_package(&pool).await;
        let charge_id = unique_charge_id();

        let outcome = service
            .purchase_credits_with_promotions(&domain, package.id, &charge_id, None)
            .await
            .expect("Purchase failed");

        service
            .update_payment_status(&charge_id, &gateway_status)
            .await
            .expect("Status update failed");

        let purchase = PurchaseRepository::new(&pool)
            .find_by_id(outcome.credit_purchase.id)
            .await
            .expect("Fetch failed")
            .expect("Purchase should exist");
        assert_eq!(purchase.status, expected, "for {gateway_status:?}");
    }
}

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database"]
async fn test_unknown_transaction_id_is_purchase_not_found() {
    let pool = test_pool().await;
    let billing = StandardBillingOperations;
    let service = PurchaseService::new(&pool, &billing, None, TEST_MODEL);

    let err = service
        .update_payment_status(&unique_charge_id(), &GatewayPaymentStatus::Succeeded)
        .await
        .expect_err("Unknown transaction id should fail");
    assert!(matches!(err, LedgerError::PurchaseNotFound));
}

// ============================================================================
// Email resolution policy at purchase time
// ============================================================================

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database"]
async fn test_malformed_email_fails_validation_before_any_write() {
    let pool = test_pool().await;
    let domain = unique_domain();
    let shop = seed_shop(&pool, &domain).await;
    let package = small_package(&pool).await;

    let billing = StandardBillingOperations;
    let service = PurchaseService::new(&pool, &billing, None, TEST_MODEL);

    let err = service
        .purchase_credits_with_promotions(&domain, package.id, &unique_charge_id(), Some("not-an-email"))
        .await
        .expect_err("Malformed email should fail");
    assert!(matches!(err, LedgerError::Validation(_)));

    let purchases: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM ledger.credit_purchases WHERE shop_id = $1")
            .bind(shop.id)
            .fetch_one(&pool)
            .await
            .expect("Count query failed");
    assert_eq!(purchases, 0);
}

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database"]
async fn test_unregistered_email_is_a_hard_error() {
    let pool = test_pool().await;
    let domain = unique_domain();
    seed_shop(&pool, &domain).await;
    let package = small_package(&pool).await;

    let billing = StandardBillingOperations;
    let service = PurchaseService::new(&pool, &billing, None, TEST_MODEL);

    let err = service
        .purchase_credits_with_promotions(
            &domain,
            package.id,
            &unique_charge_id(),
            Some("stranger@example.com"),
        )
        .await
        .expect_err("Unregistered email should fail");
    assert!(matches!(err, LedgerError::AssociatedUserNotFound { .. }));
}
