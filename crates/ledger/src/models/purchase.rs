//! Credit purchases, payments, billing events, and the notification outbox.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use storescribe_core::{
    AssociatedUserId, BillingEventId, BillingEventKind, BillingType, CurrencyCode, DiscountId,
    Email, NotificationId, NotificationStatus, PackageId, PaymentId, PaymentStatus, PromotionId,
    PurchaseId, PurchaseStatus, ShopId, SubscriptionId, UsageId,
};

use super::package::{CreditPackage, Feature};

/// A purchase of a credit package by a shop.
///
/// The package is snapshotted into [`PackageSnapshot`] at purchase time, so
/// later catalog edits never affect existing purchases. Status transitions
/// are the only post-creation mutation path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditPurchase {
    pub id: PurchaseId,
    pub shop_id: ShopId,
    pub package_id: PackageId,
    pub usage_id: UsageId,
    pub associated_user_id: Option<AssociatedUserId>,
    /// The Shopify one-time-charge transaction id; unique.
    pub shopify_purchase_id: String,
    pub snapshot: PackageSnapshot,
    pub status: PurchaseStatus,
    pub purchased_at: DateTime<Utc>,
    /// Set when the expiry sweep transitions the purchase to EXPIRED.
    pub expired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable copy of the package fields taken at purchase time.
///
/// Deliberately excludes the catalog row's id so the snapshot is decoupled
/// from later catalog edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSnapshot {
    pub name: String,
    pub credit_amount: Decimal,
    pub price_per_credit: Decimal,
    pub total_price: Decimal,
    pub currency: CurrencyCode,
    pub is_custom: bool,
    pub feature: Feature,
}

impl PackageSnapshot {
    /// Snapshot a catalog package.
    #[must_use]
    pub fn of(package: &CreditPackage) -> Self {
        Self {
            name: package.name.clone(),
            credit_amount: package.credit_amount,
            price_per_credit: package.price_per_credit,
            total_price: package.total_price,
            currency: package.currency,
            is_custom: package.is_custom,
            feature: package.feature.clone(),
        }
    }
}

/// A payment record, one-to-one with a purchase or subscription.
///
/// Immutable except for `status`, which is driven by gateway webhooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub purchase_id: Option<PurchaseId>,
    pub subscription_id: Option<SubscriptionId>,
    /// Catalog price before adjustments.
    pub amount: Decimal,
    /// Price actually charged after promotions/discounts.
    pub adjusted_amount: Decimal,
    pub currency: CurrencyCode,
    pub billing_type: BillingType,
    pub status: PaymentStatus,
    /// Gateway transaction id; unique.
    pub transaction_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit entry for a promotion or discount applied to a
/// purchase. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingEvent {
    pub id: BillingEventId,
    pub purchase_id: PurchaseId,
    pub kind: BillingEventKind,
    pub promotion_id: Option<PromotionId>,
    pub discount_id: Option<DiscountId>,
    /// Amount deducted from the running price by this adjustment.
    pub amount: Decimal,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Notification topic for a completed purchase.
pub const TOPIC_CREDITS_PURCHASED: &str = "CREDITS_PURCHASED";

/// An outbox row written inside the purchase transaction.
///
/// The email dispatch runs after commit and records its outcome here, so a
/// delivery failure never implies a failed purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub shop_id: ShopId,
    pub purchase_id: Option<PurchaseId>,
    pub topic: String,
    pub recipient: Option<Email>,
    pub status: NotificationStatus,
    /// Delivery error message when `status` is FAILED.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}
