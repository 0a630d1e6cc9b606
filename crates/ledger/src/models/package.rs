//! Credit package catalog entries and their resource limits.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use storescribe_core::{CurrencyCode, PackageId};

/// A purchasable bundle of credits plus per-service limits.
///
/// Standard packages are upserted idempotently by name. Custom packages are
/// generated per-purchase with a unique timestamped name and are immutable
/// once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditPackage {
    pub id: PackageId,
    /// Unique catalog name (e.g. `SMALL`, or `custom-200-1726041600`).
    pub name: String,
    pub credit_amount: Decimal,
    pub price_per_credit: Decimal,
    pub total_price: Decimal,
    pub currency: CurrencyCode,
    pub is_custom: bool,
    pub is_active: bool,
    /// Per-service resource limits; attached 1:1 at creation, never mutated.
    pub feature: Feature,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-package resource limits for both metered services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub ai: AiFeature,
    pub crawl: CrawlFeature,
}

/// AI service ceilings for a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiFeature {
    /// Total AI requests the package allows.
    pub request_limit: i64,
    /// Total tokens (input + output) the package allows.
    pub token_limit: i64,
    /// Credits reserved for the AI service.
    pub credit_limit: Decimal,
    pub rate: RateLimits,
}

/// Crawl service ceilings for a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlFeature {
    /// Total crawl requests the package allows.
    pub request_limit: i64,
    /// Credits reserved for the crawl service.
    pub credit_limit: Decimal,
    pub rate: RateLimits,
}

/// Rolling-window rate limits (requests/tokens per minute/day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    /// Requests per minute.
    pub rpm: i32,
    /// Requests per day.
    pub rpd: i32,
    /// Tokens per minute.
    pub tpm: i32,
    /// Tokens per day.
    pub tpd: i32,
}

impl RateLimits {
    /// A zeroed limit set (used by crawl tiers that meter requests only).
    #[must_use]
    pub const fn none() -> Self {
        Self {
            rpm: 0,
            rpd: 0,
            tpm: 0,
            tpd: 0,
        }
    }
}
