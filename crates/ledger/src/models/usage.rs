//! Usage records: per-purchase consumption counters split by service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use storescribe_core::{AssociatedUserId, ShopId, SubscriptionId, UsageId};

use super::package::Feature;

/// The mutable counter record tracking how much of a package's allowance has
/// been consumed, split by service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub id: UsageId,
    pub shop_id: ShopId,
    /// Staff user the usage is attributed to, when known.
    pub associated_user_id: Option<AssociatedUserId>,
    /// Set when this record meters a subscription instead of a purchase.
    pub subscription_id: Option<SubscriptionId>,
    /// AI model name the usage record was seeded with.
    pub model_name: String,
    pub service_usage: ServiceUsage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate of per-service usage details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceUsage {
    pub ai: ServiceUsageDetails,
    pub crawl: ServiceUsageDetails,
}

impl ServiceUsage {
    /// Seed a fresh aggregate from a package's feature limits: zeroed
    /// consumption, full remaining counts, reset timestamps at `now`.
    #[must_use]
    pub fn seeded_from(feature: &Feature, now: DateTime<Utc>) -> Self {
        Self {
            ai: ServiceUsageDetails::seeded(
                feature.ai.request_limit,
                feature.ai.credit_limit,
                now,
            ),
            crawl: ServiceUsageDetails::seeded(
                feature.crawl.request_limit,
                feature.crawl.credit_limit,
                now,
            ),
        }
    }

    /// Credits consumed across both services.
    #[must_use]
    pub fn credits_used(&self) -> Decimal {
        self.ai.credits_used + self.crawl.credits_used
    }
}

/// Consumption counters for a single service.
///
/// Invariant: `requests_used + requests_remaining == total_requests` must
/// hold at creation and under every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceUsageDetails {
    pub total_requests: i64,
    pub requests_used: i64,
    pub requests_remaining: i64,
    pub total_credits: Decimal,
    pub credits_used: Decimal,
    pub credits_remaining: Decimal,
    pub input_tokens_used: i64,
    pub output_tokens_used: i64,
    /// Rolling-window reset for per-minute rate limiting.
    pub minute_reset_at: DateTime<Utc>,
    /// Rolling-window reset for per-day rate limiting.
    pub day_reset_at: DateTime<Utc>,
}

impl ServiceUsageDetails {
    /// A freshly seeded counter set.
    #[must_use]
    pub fn seeded(total_requests: i64, total_credits: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            total_requests,
            requests_used: 0,
            requests_remaining: total_requests,
            total_credits,
            credits_used: Decimal::ZERO,
            credits_remaining: total_credits,
            input_tokens_used: 0,
            output_tokens_used: 0,
            minute_reset_at: now,
            day_reset_at: now,
        }
    }

    /// Whether the request-count invariant holds.
    #[must_use]
    pub const fn request_counts_consistent(&self) -> bool {
        self.requests_used + self.requests_remaining == self.total_requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::package::{AiFeature, CrawlFeature, RateLimits};

    fn feature() -> Feature {
        Feature {
            ai: AiFeature {
                request_limit: 500,
                token_limit: 100_000,
                credit_limit: Decimal::new(50, 0),
                rate: RateLimits {
                    rpm: 10,
                    rpd: 1000,
                    tpm: 20_000,
                    tpd: 500_000,
                },
            },
            crawl: CrawlFeature {
                request_limit: 50,
                credit_limit: Decimal::new(50, 0),
                rate: RateLimits::none(),
            },
        }
    }

    #[test]
    fn test_seeded_counters_are_zeroed_and_full() {
        let now = Utc::now();
        let usage = ServiceUsage::seeded_from(&feature(), now);

        assert_eq!(usage.ai.requests_used, 0);
        assert_eq!(usage.ai.requests_remaining, 500);
        assert_eq!(usage.ai.total_requests, 500);
        assert_eq!(usage.crawl.requests_remaining, 50);
        assert_eq!(usage.ai.credits_remaining, Decimal::new(50, 0));
        assert_eq!(usage.ai.minute_reset_at, now);
        assert_eq!(usage.crawl.day_reset_at, now);
    }

    #[test]
    fn test_seeded_satisfies_request_invariant() {
        let usage = ServiceUsage::seeded_from(&feature(), Utc::now());
        assert!(usage.ai.request_counts_consistent());
        assert!(usage.crawl.request_counts_consistent());
    }

    #[test]
    fn test_credits_used_sums_both_services() {
        let mut usage = ServiceUsage::seeded_from(&feature(), Utc::now());
        usage.ai.credits_used = Decimal::new(3, 0);
        usage.crawl.credits_used = Decimal::new(2, 0);
        assert_eq!(usage.credits_used(), Decimal::new(5, 0));
    }
}
