//! Integration tests for the expiry sweep and expired-package reporting.
//!
//! These tests require a running `PostgreSQL` database reachable via
//! `LEDGER_DATABASE_URL`.
//!
//! Run with: cargo test -p storescribe-integration-tests -- --ignored

use rust_decimal::Decimal;
use sqlx::PgPool;

use storescribe_core::PurchaseStatus;
use storescribe_integration_tests::{
    consume_ai_credits, seed_shop, test_pool, unique_charge_id, unique_domain,
};
use storescribe_ledger::db::{ExpiredPackageFilter, PurchaseRepository, PurchaseSortKey, SortOrder};
use storescribe_ledger::models::CreditPurchase;
use storescribe_ledger::services::{CatalogService, PurchaseService, StandardBillingOperations};

const TEST_MODEL: &str = "scribe-standard-v2";

async fn purchase_small(
    pool: &PgPool,
    service: &PurchaseService<'_>,
    domain: &str,
) -> CreditPurchase {
    CatalogService::new(pool)
        .create_standard_credit_packages()
        .await
        .expect("Seeding failed");
    let package = CatalogService::new(pool)
        .package_by_name("SMALL")
        .await
        .expect("SMALL package missing");
    service
        .purchase_credits_with_promotions(domain, package.id, &unique_charge_id(), None)
        .await
        .expect("Purchase failed")
        .credit_purchase
}

// ============================================================================
// P6: expiry sweep
// ============================================================================

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database"]
async fn test_sweep_expires_consumed_and_keeps_partial() {
    let pool = test_pool().await;
    let domain = unique_domain();
    seed_shop(&pool, &domain).await;

    let billing = StandardBillingOperations;
    let service = PurchaseService::new(&pool, &billing, None, TEST_MODEL);

    // One purchase fully consumed, one only half.
    let consumed = purchase_small(&pool, &service, &domain).await;
    let partial = purchase_small(&pool, &service, &domain).await;
    consume_ai_credits(&pool, consumed.usage_id, Decimal::from(100)).await;
    consume_ai_credits(&pool, partial.usage_id, Decimal::from(50)).await;

    let expired = service
        .check_and_update_package_status(&domain)
        .await
        .expect("Sweep failed");
    assert_eq!(expired, 1);

    let repo = PurchaseRepository::new(&pool);
    let consumed = repo
        .find_by_id(consumed.id)
        .await
        .expect("Fetch failed")
        .expect("Purchase should exist");
    assert_eq!(consumed.status, PurchaseStatus::Expired);
    assert!(consumed.expired_at.is_some());

    let partial = repo
        .find_by_id(partial.id)
        .await
        .expect("Fetch failed")
        .expect("Purchase should exist");
    assert_eq!(partial.status, PurchaseStatus::Active);

    // A second sweep finds nothing new.
    let expired = service
        .check_and_update_package_status(&domain)
        .await
        .expect("Second sweep failed");
    assert_eq!(expired, 0);
}

// ============================================================================
// Scenario C: expired-package filtering and sorting
// ============================================================================

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database"]
async fn test_expired_packages_filter_and_sort() {
    let pool = test_pool().await;
    let domain = unique_domain();
    seed_shop(&pool, &domain).await;

    let billing = StandardBillingOperations;
    let service = PurchaseService::new(&pool, &billing, None, TEST_MODEL);

    // Three purchases, consumed 100, 100, and 30 credits. The sweep expires
    // the first two; with min_credits_used = 50 only those two are listed.
    let first = purchase_small(&pool, &service, &domain).await;
    let second = purchase_small(&pool, &service, &domain).await;
    let below = purchase_small(&pool, &service, &domain).await;
    consume_ai_credits(&pool, first.usage_id, Decimal::from(100)).await;
    consume_ai_credits(&pool, second.usage_id, Decimal::from(100)).await;
    consume_ai_credits(&pool, below.usage_id, Decimal::from(30)).await;

    service
        .check_and_update_package_status(&domain)
        .await
        .expect("Sweep failed");

    let page = service
        .expired_packages(
            &domain,
            &ExpiredPackageFilter {
                min_credits_used: Some(Decimal::from(50)),
                sort_by: PurchaseSortKey::ExpiredAt,
                sort_order: SortOrder::Asc,
                ..ExpiredPackageFilter::default()
            },
        )
        .await
        .expect("Listing failed");

    assert_eq!(page.total, 2);
    assert_eq!(page.packages.len(), 2);
    assert!(page
        .packages
        .iter()
        .all(|p| p.credits_used >= Decimal::from(50)));

    let expired_ats: Vec<_> = page
        .packages
        .iter()
        .map(|p| p.purchase.expired_at.expect("expired_at must be set"))
        .collect();
    let mut sorted = expired_ats.clone();
    sorted.sort();
    assert_eq!(expired_ats, sorted);
}

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database"]
async fn test_expired_packages_range_and_package_filters() {
    let pool = test_pool().await;
    let domain = unique_domain();
    seed_shop(&pool, &domain).await;

    let billing = StandardBillingOperations;
    let service = PurchaseService::new(&pool, &billing, None, TEST_MODEL);

    // A SMALL (100 credits) and a MEDIUM (500 credits) purchase, both fully
    // consumed so the sweep expires both.
    let small = purchase_small(&pool, &service, &domain).await;
    let medium_package = CatalogService::new(&pool)
        .package_by_name("MEDIUM")
        .await
        .expect("MEDIUM package missing");
    let medium = service
        .purchase_credits_with_promotions(&domain, medium_package.id, &unique_charge_id(), None)
        .await
        .expect("Purchase failed")
        .credit_purchase;
    consume_ai_credits(&pool, small.usage_id, Decimal::from(100)).await;
    consume_ai_credits(&pool, medium.usage_id, Decimal::from(500)).await;

    service
        .check_and_update_package_status(&domain)
        .await
        .expect("Sweep failed");

    // max_credits_used keeps only the 100-credit consumption.
    let page = service
        .expired_packages(
            &domain,
            &ExpiredPackageFilter {
                max_credits_used: Some(Decimal::from(200)),
                ..ExpiredPackageFilter::default()
            },
        )
        .await
        .expect("Listing failed");
    assert_eq!(page.total, 1);
    assert_eq!(page.packages[0].purchase.id, small.id);

    // package_id pins the listing to one catalog entry.
    let page = service
        .expired_packages(
            &domain,
            &ExpiredPackageFilter {
                package_id: Some(medium_package.id),
                ..ExpiredPackageFilter::default()
            },
        )
        .await
        .expect("Listing failed");
    assert_eq!(page.total, 1);
    assert_eq!(page.packages[0].purchase.id, medium.id);

    // The creation-time bounds are inclusive; splitting on each purchase's
    // own created_at isolates it from the other.
    let page = service
        .expired_packages(
            &domain,
            &ExpiredPackageFilter {
                created_after: Some(medium.created_at),
                ..ExpiredPackageFilter::default()
            },
        )
        .await
        .expect("Listing failed");
    assert_eq!(page.total, 1);
    assert_eq!(page.packages[0].purchase.id, medium.id);

    let page = service
        .expired_packages(
            &domain,
            &ExpiredPackageFilter {
                created_before: Some(small.created_at),
                ..ExpiredPackageFilter::default()
            },
        )
        .await
        .expect("Listing failed");
    assert_eq!(page.total, 1);
    assert_eq!(page.packages[0].purchase.id, small.id);
}

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database"]
async fn test_expired_packages_pagination_keeps_full_total() {
    let pool = test_pool().await;
    let domain = unique_domain();
    seed_shop(&pool, &domain).await;

    let billing = StandardBillingOperations;
    let service = PurchaseService::new(&pool, &billing, None, TEST_MODEL);

    for _ in 0..3 {
        let purchase = purchase_small(&pool, &service, &domain).await;
        consume_ai_credits(&pool, purchase.usage_id, Decimal::from(100)).await;
    }
    service
        .check_and_update_package_status(&domain)
        .await
        .expect("Sweep failed");

    let page = service
        .expired_packages(
            &domain,
            &ExpiredPackageFilter {
                limit: Some(2),
                offset: Some(0),
                ..ExpiredPackageFilter::default()
            },
        )
        .await
        .expect("Listing failed");

    assert_eq!(page.packages.len(), 2);
    assert_eq!(page.total, 3);
}
