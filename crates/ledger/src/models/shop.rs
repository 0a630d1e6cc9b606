//! Tenant identity: shops, staff accounts, and subscriptions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use storescribe_core::{AssociatedUserId, Email, ShopId, SubscriptionId};

/// A storefront tenant. Created on first session storage, deleted on
/// uninstall cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shop {
    pub id: ShopId,
    /// The `*.myshopify.com` domain; unique per shop.
    pub domain: String,
    /// Display name, if the shop has provided one.
    pub name: Option<String>,
    /// Primary contact address from the Shopify shop record.
    pub email: Option<Email>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A Shopify staff account associated with a shop via an online session.
///
/// Upserted idempotently keyed by `(shop_id, external_user_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociatedUser {
    pub id: AssociatedUserId,
    pub shop_id: ShopId,
    /// Shopify's numeric staff user id.
    pub external_user_id: i64,
    pub email: Option<Email>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Whether this user currently has an active online session.
    pub session_active: bool,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A shop's subscription with a drawable credit balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub shop_id: ShopId,
    pub plan_name: String,
    /// Remaining credits; decremented by `deduct_credits` under a
    /// serializable transaction.
    pub credit_balance: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

