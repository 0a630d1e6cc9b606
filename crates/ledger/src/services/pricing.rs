//! Final-price computation for a package purchase.
//!
//! The resolver loads the package's base price and every promotion and
//! discount applicable to the shop and package right now. The arithmetic
//! itself sits behind [`BillingOperations`] so deployments can swap the
//! adjustment policy without touching selection or recording.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;

use storescribe_core::{AdjustmentKind, PackageId, Price, ShopId};

use crate::db::{PackageRepository, PromotionRepository};
use crate::error::{LedgerError, Result};
use crate::models::{Discount, Promotion};

/// Computes the money taken off the running price by one adjustment.
///
/// Implementations see the price as it stands after earlier adjustments,
/// promotions first, discounts second, each list in creation order.
pub trait BillingOperations: Send + Sync {
    /// The reduction a single adjustment produces against `current`.
    /// Must never exceed `current.amount`.
    fn reduction(&self, current: &Price, kind: AdjustmentKind, value: Decimal) -> Decimal;
}

/// Default adjustment arithmetic: percentage of the running price, or a
/// fixed amount, clamped so the price never goes negative.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardBillingOperations;

impl BillingOperations for StandardBillingOperations {
    fn reduction(&self, current: &Price, kind: AdjustmentKind, value: Decimal) -> Decimal {
        let raw = match kind {
            AdjustmentKind::Percentage => current.amount * value / Decimal::ONE_HUNDRED,
            AdjustmentKind::Fixed => value,
        };
        raw.min(current.amount).max(Decimal::ZERO)
    }
}

/// A promotion the resolver consumed, with the reduction it produced.
#[derive(Debug, Clone)]
pub struct AppliedPromotion {
    pub promotion: Promotion,
    pub amount: Decimal,
}

/// A discount the resolver consumed, with the reduction it produced.
#[derive(Debug, Clone)]
pub struct AppliedDiscount {
    pub discount: Discount,
    pub amount: Decimal,
}

/// The resolved price for one purchase.
#[derive(Debug, Clone)]
pub struct FinalPrice {
    /// What the shop pays.
    pub final_price: Price,
    /// Total reduction against the base price.
    pub total_reduction: Decimal,
    pub applied_promotions: Vec<AppliedPromotion>,
    pub applied_discounts: Vec<AppliedDiscount>,
}

/// Service resolving purchase prices.
pub struct PricingService<'a> {
    pool: &'a PgPool,
    billing: &'a dyn BillingOperations,
}

impl<'a> PricingService<'a> {
    /// Create a new pricing service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, billing: &'a dyn BillingOperations) -> Self {
        Self { pool, billing }
    }

    /// Resolve the final price for purchasing `package_id` as `shop_id`.
    ///
    /// Every promotion and discount in the result was consumed by the
    /// computation; the purchase transaction must record a billing event and
    /// increment the use counter for each, exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::PackageNotFound`] if the package doesn't
    /// exist, or a repository error if a query fails.
    #[instrument(skip(self))]
    pub async fn calculate_final_price(
        &self,
        package_id: PackageId,
        shop_id: ShopId,
    ) -> Result<FinalPrice> {
        let package = PackageRepository::new(self.pool)
            .find_by_id(package_id)
            .await?
            .ok_or(LedgerError::PackageNotFound)?;

        let base = Price::new(package.total_price, package.currency);
        let now = Utc::now();

        let promotions = PromotionRepository::new(self.pool)
            .applicable_promotions(shop_id, package_id, now)
            .await?;
        let discounts = PromotionRepository::new(self.pool)
            .applicable_discounts(shop_id, package_id, now)
            .await?;

        let mut current = base;
        let mut applied_promotions = Vec::with_capacity(promotions.len());
        for promotion in promotions {
            let amount = self
                .billing
                .reduction(&current, promotion.kind, promotion.value);
            current.amount -= amount;
            applied_promotions.push(AppliedPromotion { promotion, amount });
        }

        let mut applied_discounts = Vec::with_capacity(discounts.len());
        for discount in discounts {
            let amount = self
                .billing
                .reduction(&current, discount.kind, discount.value);
            current.amount -= amount;
            applied_discounts.push(AppliedDiscount { discount, amount });
        }

        Ok(FinalPrice {
            total_reduction: base.amount - current.amount,
            final_price: current,
            applied_promotions,
            applied_discounts,
        })
    }
}
