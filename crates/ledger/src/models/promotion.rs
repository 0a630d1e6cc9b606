//! Promotion and discount catalog entries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use storescribe_core::{AdjustmentKind, DiscountId, PackageId, PromotionId, ShopId};

/// A promotional price adjustment.
///
/// Applicable when active, inside its time window, under `max_uses`, and
/// scoped to the shop and/or package (a `None` scope matches everything).
/// `used_count` is incremented atomically each time the promotion is
/// applied, inside the purchase transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promotion {
    pub id: PromotionId,
    /// Unique code (e.g. `LAUNCH20`).
    pub code: String,
    pub name: String,
    pub kind: AdjustmentKind,
    /// Percentage (0-100) or fixed amount, per `kind`.
    pub value: Decimal,
    /// Restrict to one shop; `None` applies to all shops.
    pub shop_id: Option<ShopId>,
    /// Restrict to one package; `None` applies to all packages.
    pub package_id: Option<PackageId>,
    pub starts_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i64>,
    pub used_count: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A discount price adjustment. Same applicability rules as [`Promotion`];
/// discounts are applied after promotions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discount {
    pub id: DiscountId,
    /// Unique code.
    pub code: String,
    pub name: String,
    pub kind: AdjustmentKind,
    /// Percentage (0-100) or fixed amount, per `kind`.
    pub value: Decimal,
    pub shop_id: Option<ShopId>,
    pub package_id: Option<PackageId>,
    pub starts_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i64>,
    pub used_count: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
