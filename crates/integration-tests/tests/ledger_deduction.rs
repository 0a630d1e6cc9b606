//! Integration tests for subscription credit deduction.
//!
//! These tests require a running `PostgreSQL` database reachable via
//! `LEDGER_DATABASE_URL`.
//!
//! Run with: cargo test -p storescribe-integration-tests -- --ignored

use rust_decimal::Decimal;

use storescribe_integration_tests::{seed_shop, test_pool, unique_domain};
use storescribe_ledger::db::SubscriptionRepository;
use storescribe_ledger::error::LedgerError;
use storescribe_ledger::services::{PurchaseService, StandardBillingOperations};

const TEST_MODEL: &str = "scribe-standard-v2";

// ============================================================================
// Basic deduction
// ============================================================================

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database"]
async fn test_deduction_decrements_balance_and_meters_usage() {
    let pool = test_pool().await;
    let domain = unique_domain();
    let shop = seed_shop(&pool, &domain).await;
    let subscription = SubscriptionRepository::new(&pool)
        .create(shop.id, "starter", Decimal::from(100))
        .await
        .expect("Subscription create failed");

    let billing = StandardBillingOperations;
    let service = PurchaseService::new(&pool, &billing, None, TEST_MODEL);

    let updated = service
        .deduct_credits(&domain, Decimal::from(30), TEST_MODEL, 1_200, 350)
        .await
        .expect("Deduction failed");
    assert_eq!(updated.credit_balance, Decimal::from(70));

    let (credits_used, input_tokens): (Decimal, i64) = sqlx::query_as(
        r"
        SELECT ai_credits_used, ai_input_tokens_used
        FROM ledger.usages
        WHERE subscription_id = $1
        ",
    )
    .bind(subscription.id)
    .fetch_one(&pool)
    .await
    .expect("Usage query failed");
    assert_eq!(credits_used, Decimal::from(30));
    assert_eq!(input_tokens, 1_200);
}

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database"]
async fn test_overdraw_reports_available_and_required() {
    let pool = test_pool().await;
    let domain = unique_domain();
    let shop = seed_shop(&pool, &domain).await;
    SubscriptionRepository::new(&pool)
        .create(shop.id, "starter", Decimal::from(5))
        .await
        .expect("Subscription create failed");

    let billing = StandardBillingOperations;
    let service = PurchaseService::new(&pool, &billing, None, TEST_MODEL);

    let err = service
        .deduct_credits(&domain, Decimal::from(10), TEST_MODEL, 0, 0)
        .await
        .expect_err("Overdraw should fail");
    match err {
        LedgerError::InsufficientCredits {
            available,
            required,
        } => {
            assert_eq!(available, Decimal::from(5));
            assert_eq!(required, Decimal::from(10));
        }
        other => panic!("expected InsufficientCredits, got {other:?}"),
    }
}

// ============================================================================
// P2: no double-spend under concurrency
// ============================================================================

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database"]
async fn test_concurrent_deductions_never_double_spend() {
    let pool = test_pool().await;
    let domain = unique_domain();
    let shop = seed_shop(&pool, &domain).await;
    let subscription = SubscriptionRepository::new(&pool)
        .create(shop.id, "starter", Decimal::from(10))
        .await
        .expect("Subscription create failed");

    let billing = StandardBillingOperations;
    let service = PurchaseService::new(&pool, &billing, None, TEST_MODEL);

    // Two racers each try to take the full balance.
    let (a, b) = tokio::join!(
        service.deduct_credits(&domain, Decimal::from(10), TEST_MODEL, 0, 0),
        service.deduct_credits(&domain, Decimal::from(10), TEST_MODEL, 0, 0),
    );

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one racer may win: {a:?} / {b:?}");

    let loser = if a.is_err() { a } else { b };
    assert!(matches!(
        loser,
        Err(LedgerError::InsufficientCredits { .. })
    ));

    let balance: Decimal =
        sqlx::query_scalar("SELECT credit_balance FROM ledger.subscriptions WHERE id = $1")
            .bind(subscription.id)
            .fetch_one(&pool)
            .await
            .expect("Balance query failed");
    assert_eq!(balance, Decimal::ZERO);
}
