//! Credit package catalog.
//!
//! The standard catalog is seeded idempotently by name; custom packages are
//! generated per purchase with a timestamped name and never touched again.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sqlx::PgPool;
use tracing::instrument;

use storescribe_core::{PackageId, Price};

use crate::db::{NewPackage, PackageRepository};
use crate::error::{LedgerError, Result};
use crate::models::{AiFeature, CrawlFeature, CreditPackage, Feature, RateLimits};

/// One row of the fixed standard catalog.
struct StandardPackage {
    name: &'static str,
    credits: i64,
    total_price: i64,
    ai_token_limit: i64,
}

/// The standard catalog, ordered by size. Request allowances derive from
/// the credit amount with the same ratios custom packages use.
const STANDARD_PACKAGES: [StandardPackage; 4] = [
    StandardPackage {
        name: "SMALL",
        credits: 100,
        total_price: 10,
        ai_token_limit: 100_000,
    },
    StandardPackage {
        name: "MEDIUM",
        credits: 500,
        total_price: 45,
        ai_token_limit: 500_000,
    },
    StandardPackage {
        name: "LARGE",
        credits: 1_000,
        total_price: 80,
        ai_token_limit: 1_000_000,
    },
    StandardPackage {
        name: "ENTERPRISE",
        credits: 5_000,
        total_price: 350,
        ai_token_limit: 5_000_000,
    },
];

const STANDARD_RATE_LIMITS: RateLimits = RateLimits {
    rpm: 60,
    rpd: 10_000,
    tpm: 100_000,
    tpd: 2_000_000,
};

/// Request to mint a custom package for one purchase.
#[derive(Debug, Clone)]
pub struct CustomPackageRequest {
    pub price: Price,
    pub credits: Decimal,
}

/// Service managing the package catalog.
pub struct CatalogService<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogService<'a> {
    /// Create a new catalog service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Seed or refresh the standard catalog. Upserts by name, so repeated
    /// calls leave exactly one row per package.
    ///
    /// # Errors
    ///
    /// Returns a repository error if an upsert fails.
    #[instrument(skip(self))]
    pub async fn create_standard_credit_packages(&self) -> Result<Vec<CreditPackage>> {
        let repo = PackageRepository::new(self.pool);
        let mut packages = Vec::with_capacity(STANDARD_PACKAGES.len());

        for entry in &STANDARD_PACKAGES {
            let credits = Decimal::from(entry.credits);
            let total_price = Decimal::from(entry.total_price);
            let (ai_requests, crawl_requests) = feature_request_limits(credits);

            let package = repo
                .upsert_by_name(&NewPackage {
                    name: entry.name.to_owned(),
                    credit_amount: credits,
                    price_per_credit: total_price / credits,
                    total_price,
                    currency: storescribe_core::CurrencyCode::USD,
                    is_custom: false,
                    feature: Feature {
                        ai: AiFeature {
                            request_limit: ai_requests,
                            token_limit: entry.ai_token_limit,
                            credit_limit: credits,
                            rate: STANDARD_RATE_LIMITS,
                        },
                        crawl: CrawlFeature {
                            request_limit: crawl_requests,
                            credit_limit: credits,
                            rate: STANDARD_RATE_LIMITS,
                        },
                    },
                })
                .await?;
            packages.push(package);
        }

        Ok(packages)
    }

    /// Active, non-custom packages ordered by credit amount ascending.
    ///
    /// # Errors
    ///
    /// Returns a repository error if the query fails.
    pub async fn all_standard_packages(&self) -> Result<Vec<CreditPackage>> {
        Ok(PackageRepository::new(self.pool).all_standard().await?)
    }

    /// Fetch a package by id.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::PackageNotFound`] if the package doesn't
    /// exist. Absence is an error here, not an empty result.
    pub async fn package_by_id(&self, id: PackageId) -> Result<CreditPackage> {
        PackageRepository::new(self.pool)
            .find_by_id(id)
            .await?
            .ok_or(LedgerError::PackageNotFound)
    }

    /// Fetch a package by name.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::PackageNotFound`] if the package doesn't
    /// exist.
    pub async fn package_by_name(&self, name: &str) -> Result<CreditPackage> {
        PackageRepository::new(self.pool)
            .find_by_name(name)
            .await?
            .ok_or(LedgerError::PackageNotFound)
    }

    /// Mint a custom package for one purchase.
    ///
    /// The package and its feature limits are created in one statement;
    /// the name embeds the credit amount and a millisecond timestamp so
    /// every custom package is unique.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if the price or credit amount is
    /// not positive, or a repository error if the insert fails.
    #[instrument(skip(self, request))]
    pub async fn create_custom_credit_package(
        &self,
        request: &CustomPackageRequest,
    ) -> Result<CreditPackage> {
        if !request.price.is_positive() {
            return Err(LedgerError::Validation(
                "custom package price must be positive".to_owned(),
            ));
        }
        if request.credits <= Decimal::ZERO {
            return Err(LedgerError::Validation(
                "custom package credits must be positive".to_owned(),
            ));
        }

        let credits = request.credits;
        let (ai_requests, crawl_requests) = feature_request_limits(credits);
        let name = format!(
            "custom-{}-{}",
            credits.normalize(),
            Utc::now().timestamp_millis()
        );

        let package = PackageRepository::new(self.pool)
            .insert_custom(&NewPackage {
                name,
                credit_amount: credits,
                price_per_credit: request.price.amount / credits,
                total_price: request.price.amount,
                currency: request.price.currency,
                is_custom: true,
                feature: Feature {
                    ai: AiFeature {
                        request_limit: ai_requests,
                        token_limit: token_limit_for(credits),
                        credit_limit: credits,
                        rate: STANDARD_RATE_LIMITS,
                    },
                    crawl: CrawlFeature {
                        request_limit: crawl_requests,
                        credit_limit: credits,
                        rate: STANDARD_RATE_LIMITS,
                    },
                },
            })
            .await
            .map_err(super::lift)?;

        Ok(package)
    }
}

/// Request allowances derived from a credit amount.
///
/// AI requests are `floor(credits / 0.1) * 0.5`, Crawl requests are
/// `credits * 0.5`. The AI formula nets out to `credits * 5`; shops are
/// billed against these exact numbers, so the formula must not change.
fn feature_request_limits(credits: Decimal) -> (i64, i64) {
    let tenth = Decimal::new(1, 1);
    let half = Decimal::new(5, 1);
    let ai = ((credits / tenth).floor() * half).trunc();
    let crawl = (credits * half).trunc();
    (
        ai.to_i64().unwrap_or(i64::MAX),
        crawl.to_i64().unwrap_or(i64::MAX),
    )
}

/// Token allowance for custom packages, proportional to the standard
/// catalog's 1000 tokens per credit.
fn token_limit_for(credits: Decimal) -> i64 {
    (credits * Decimal::from(1_000))
        .trunc()
        .to_i64()
        .unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_formula_yields_literal_values() {
        // 200 credits: floor(200 / 0.1) * 0.5 = 1000 AI requests,
        // 200 * 0.5 = 100 crawl requests.
        let (ai, crawl) = feature_request_limits(Decimal::from(200));
        assert_eq!(ai, 1_000);
        assert_eq!(crawl, 100);
    }

    #[test]
    fn test_custom_formula_truncates_fractional_credits() {
        // 0.35 credits: floor(3.5) * 0.5 = 1.5, truncated to 1.
        let (ai, crawl) = feature_request_limits(Decimal::new(35, 2));
        assert_eq!(ai, 1);
        assert_eq!(crawl, 0);
    }

    #[test]
    fn test_price_per_credit_division() {
        // Scenario: $50 for 200 credits is $0.25 per credit.
        let price_per_credit = Decimal::from(50) / Decimal::from(200);
        assert_eq!(price_per_credit, Decimal::new(25, 2));
    }

    #[test]
    fn test_standard_catalog_is_ordered_by_size() {
        let credits: Vec<i64> = STANDARD_PACKAGES.iter().map(|p| p.credits).collect();
        let mut sorted = credits.clone();
        sorted.sort_unstable();
        assert_eq!(credits, sorted);
    }
}
