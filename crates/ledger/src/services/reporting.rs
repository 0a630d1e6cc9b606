//! Read-side aggregation of active purchases and usage for display.

use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;

use storescribe_core::{BillingEventKind, CurrencyCode, PaymentStatus, PurchaseId};

use crate::db::{PurchaseRepository, ShopRepository};
use crate::error::{LedgerError, Result};
use crate::models::{BillingEvent, ServiceUsageDetails, Usage};

/// Aggregated view of a shop's active purchases.
#[derive(Debug, Clone)]
pub struct PurchaseDetailsReport {
    pub shop_domain: String,
    pub packages: Vec<PackageUsageReport>,
    /// `Σ(credit_amount - credits_used)` across active purchases.
    pub total_credits_available: Decimal,
}

/// One active purchase's reporting row.
#[derive(Debug, Clone)]
pub struct PackageUsageReport {
    pub purchase_id: PurchaseId,
    pub package_name: String,
    pub credit_amount: Decimal,
    pub credits_used: Decimal,
    pub credits_available: Decimal,
    pub usage: Option<UsageBreakdown>,
    pub payment: Option<PaymentSummary>,
    pub adjustments: BillingAdjustments,
}

/// Per-service consumption breakdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageBreakdown {
    pub ai: ServiceUsageReport,
    pub crawl: ServiceUsageReport,
}

/// Flat reporting shape for one service's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUsageReport {
    pub total_requests: i64,
    pub requests_used: i64,
    pub requests_remaining: i64,
    pub credits_used: Decimal,
    pub credits_remaining: Decimal,
    pub input_tokens_used: i64,
    pub output_tokens_used: i64,
}

impl From<&ServiceUsageDetails> for ServiceUsageReport {
    fn from(details: &ServiceUsageDetails) -> Self {
        Self {
            total_requests: details.total_requests,
            requests_used: details.requests_used,
            requests_remaining: details.requests_remaining,
            credits_used: details.credits_used,
            credits_remaining: details.credits_remaining,
            input_tokens_used: details.input_tokens_used,
            output_tokens_used: details.output_tokens_used,
        }
    }
}

/// Payment summary for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSummary {
    pub amount: Decimal,
    pub adjusted_amount: Decimal,
    pub currency: CurrencyCode,
    pub status: PaymentStatus,
}

/// Billing events partitioned by kind, creation order preserved.
#[derive(Debug, Clone, Default)]
pub struct BillingAdjustments {
    pub promotions: Vec<BillingEvent>,
    pub discounts: Vec<BillingEvent>,
}

/// Project a usage record to the flat reporting shape.
#[must_use]
pub fn package_usage_details(usage: Option<&Usage>) -> Option<UsageBreakdown> {
    usage.map(|usage| UsageBreakdown {
        ai: ServiceUsageReport::from(&usage.service_usage.ai),
        crawl: ServiceUsageReport::from(&usage.service_usage.crawl),
    })
}

/// Partition billing events into promotions and discounts, preserving order
/// within each kind.
#[must_use]
pub fn billing_adjustments(events: &[BillingEvent]) -> BillingAdjustments {
    let mut adjustments = BillingAdjustments::default();
    for event in events {
        match event.kind {
            BillingEventKind::Promotion => adjustments.promotions.push(event.clone()),
            BillingEventKind::Discount => adjustments.discounts.push(event.clone()),
        }
    }
    adjustments
}

/// Service producing purchase and usage reports.
pub struct ReportingService<'a> {
    pool: &'a PgPool,
}

impl<'a> ReportingService<'a> {
    /// Create a new reporting service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Aggregate a shop's active purchases. `Ok(None)` when the shop has
    /// none.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ShopNotFound`] for an unknown shop.
    #[instrument(skip(self, shop_domain), fields(shop = %shop_domain))]
    pub async fn purchase_details(
        &self,
        shop_domain: &str,
    ) -> Result<Option<PurchaseDetailsReport>> {
        let shop = ShopRepository::new(self.pool)
            .find_by_domain(shop_domain)
            .await?
            .ok_or(LedgerError::ShopNotFound)?;

        let details = PurchaseRepository::new(self.pool)
            .find_active_with_details(shop.id)
            .await?;

        if details.is_empty() {
            return Ok(None);
        }

        let mut packages = Vec::with_capacity(details.len());
        let mut total_credits_available = Decimal::ZERO;

        for entry in details {
            let credit_amount = entry.purchase.snapshot.credit_amount;
            let credits_used = entry.usage.service_usage.credits_used();
            let credits_available = credit_amount - credits_used;
            total_credits_available += credits_available;

            packages.push(PackageUsageReport {
                purchase_id: entry.purchase.id,
                package_name: entry.purchase.snapshot.name.clone(),
                credit_amount,
                credits_used,
                credits_available,
                usage: package_usage_details(Some(&entry.usage)),
                payment: entry.payment.map(|payment| PaymentSummary {
                    amount: payment.amount,
                    adjusted_amount: payment.adjusted_amount,
                    currency: payment.currency,
                    status: payment.status,
                }),
                adjustments: billing_adjustments(&entry.billing_events),
            });
        }

        Ok(Some(PurchaseDetailsReport {
            shop_domain: shop.domain,
            packages,
            total_credits_available,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use storescribe_core::{BillingEventId, DiscountId, PromotionId};

    fn event(kind: BillingEventKind, amount: i64) -> BillingEvent {
        BillingEvent {
            id: BillingEventId::generate(),
            purchase_id: PurchaseId::generate(),
            kind,
            promotion_id: matches!(kind, BillingEventKind::Promotion)
                .then(PromotionId::generate),
            discount_id: matches!(kind, BillingEventKind::Discount)
                .then(DiscountId::generate),
            amount: Decimal::from(amount),
            description: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_billing_adjustments_partitions_by_kind_in_order() {
        let events = vec![
            event(BillingEventKind::Promotion, 1),
            event(BillingEventKind::Discount, 2),
            event(BillingEventKind::Promotion, 3),
        ];

        let adjustments = billing_adjustments(&events);

        let promo_amounts: Vec<Decimal> =
            adjustments.promotions.iter().map(|e| e.amount).collect();
        assert_eq!(promo_amounts, vec![Decimal::from(1), Decimal::from(3)]);
        assert_eq!(adjustments.discounts.len(), 1);
        assert_eq!(adjustments.discounts[0].amount, Decimal::from(2));
    }

    #[test]
    fn test_package_usage_details_absent_usage_is_none() {
        assert_eq!(package_usage_details(None), None);
    }
}
