//! Credit purchase repository.
//!
//! Pool-level reads live on [`PurchaseRepository`]; every write that is part
//! of the purchase graph is a free function taking the caller's transaction
//! connection, so the whole graph commits or rolls back together.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, QueryBuilder, Row};
use uuid::Uuid;

use storescribe_core::{
    AssociatedUserId, BillingEventId, BillingEventKind, BillingType, DiscountId, PackageId,
    PaymentId, PaymentStatus, PromotionId, PurchaseId, PurchaseStatus, ShopId, SubscriptionId,
    UsageId,
};

use super::{RepositoryError, decode_stored};
use crate::models::{
    BillingEvent, CreditPurchase, PackageSnapshot, Payment, ServiceUsage, Usage,
};

/// Fields for a new usage row.
#[derive(Debug, Clone)]
pub struct NewUsage {
    pub shop_id: ShopId,
    pub associated_user_id: Option<AssociatedUserId>,
    pub subscription_id: Option<SubscriptionId>,
    pub model_name: String,
    pub service_usage: ServiceUsage,
}

/// Fields for a new purchase row.
#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub shop_id: ShopId,
    pub package_id: PackageId,
    pub usage_id: UsageId,
    pub associated_user_id: Option<AssociatedUserId>,
    pub shopify_purchase_id: String,
    pub snapshot: PackageSnapshot,
    pub purchased_at: DateTime<Utc>,
}

/// Fields for a new payment row.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub purchase_id: Option<PurchaseId>,
    pub subscription_id: Option<SubscriptionId>,
    pub amount: Decimal,
    pub adjusted_amount: Decimal,
    pub currency: storescribe_core::CurrencyCode,
    pub billing_type: BillingType,
    pub status: PaymentStatus,
    pub transaction_id: String,
}

/// Fields for a new billing event row.
#[derive(Debug, Clone)]
pub struct NewBillingEvent {
    pub purchase_id: PurchaseId,
    pub kind: BillingEventKind,
    pub promotion_id: Option<PromotionId>,
    pub discount_id: Option<DiscountId>,
    pub amount: Decimal,
    pub description: Option<String>,
}

/// An active purchase with its usage, payment, and billing audit trail.
#[derive(Debug, Clone)]
pub struct PurchaseWithDetails {
    pub purchase: CreditPurchase,
    pub usage: Usage,
    pub payment: Option<Payment>,
    pub billing_events: Vec<BillingEvent>,
}

/// Sort key for expired-purchase queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PurchaseSortKey {
    #[default]
    CreatedAt,
    ExpiredAt,
    UpdatedAt,
}

impl PurchaseSortKey {
    const fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::ExpiredAt => "expired_at",
            Self::UpdatedAt => "updated_at",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Desc,
    Asc,
}

impl SortOrder {
    const fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Filters for the expired-purchase listing.
#[derive(Debug, Clone, Default)]
pub struct ExpiredPackageFilter {
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub min_credits_used: Option<Decimal>,
    pub max_credits_used: Option<Decimal>,
    pub package_id: Option<PackageId>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort_by: PurchaseSortKey,
    pub sort_order: SortOrder,
}

/// An expired purchase with its consumed-credit total.
#[derive(Debug, Clone)]
pub struct ExpiredPackage {
    pub purchase: CreditPurchase,
    pub credits_used: Decimal,
}

/// One page of expired purchases plus the unpaginated total.
#[derive(Debug, Clone)]
pub struct ExpiredPackagePage {
    pub packages: Vec<ExpiredPackage>,
    pub total: i64,
}

/// Repository for purchase reads.
pub struct PurchaseRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PurchaseRepository<'a> {
    /// Create a new purchase repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Look up a purchase by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_id(
        &self,
        id: PurchaseId,
    ) -> Result<Option<CreditPurchase>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM ledger.credit_purchases WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        row.as_ref().map(purchase_from_row).transpose()
    }

    /// All ACTIVE purchases for a shop with usage, payment, and billing
    /// events attached, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails, or
    /// `RepositoryError::DataCorruption` if a purchase's usage row is
    /// missing.
    pub async fn find_active_with_details(
        &self,
        shop_id: ShopId,
    ) -> Result<Vec<PurchaseWithDetails>, RepositoryError> {
        let purchase_rows = sqlx::query(
            r"
            SELECT * FROM ledger.credit_purchases
            WHERE shop_id = $1 AND status = 'ACTIVE'
            ORDER BY created_at ASC
            ",
        )
        .bind(shop_id)
        .fetch_all(self.pool)
        .await?;

        let purchases: Vec<CreditPurchase> = purchase_rows
            .iter()
            .map(purchase_from_row)
            .collect::<Result<_, _>>()?;

        if purchases.is_empty() {
            return Ok(Vec::new());
        }

        let purchase_ids: Vec<Uuid> = purchases.iter().map(|p| p.id.as_uuid()).collect();
        let usage_ids: Vec<Uuid> = purchases.iter().map(|p| p.usage_id.as_uuid()).collect();

        let usage_rows = sqlx::query("SELECT * FROM ledger.usages WHERE id = ANY($1)")
            .bind(&usage_ids)
            .fetch_all(self.pool)
            .await?;
        let mut usages: HashMap<UsageId, Usage> = usage_rows
            .iter()
            .map(|row| usage_from_row(row).map(|u| (u.id, u)))
            .collect::<Result<_, _>>()?;

        let payment_rows =
            sqlx::query("SELECT * FROM ledger.payments WHERE purchase_id = ANY($1)")
                .bind(&purchase_ids)
                .fetch_all(self.pool)
                .await?;
        let mut payments: HashMap<PurchaseId, Payment> = HashMap::new();
        for row in &payment_rows {
            let payment = payment_from_row(row)?;
            if let Some(purchase_id) = payment.purchase_id {
                payments.insert(purchase_id, payment);
            }
        }

        let event_rows = sqlx::query(
            r"
            SELECT * FROM ledger.billing_events
            WHERE purchase_id = ANY($1)
            ORDER BY created_at ASC
            ",
        )
        .bind(&purchase_ids)
        .fetch_all(self.pool)
        .await?;
        let mut events: HashMap<PurchaseId, Vec<BillingEvent>> = HashMap::new();
        for row in &event_rows {
            let event = billing_event_from_row(row)?;
            events.entry(event.purchase_id).or_default().push(event);
        }

        purchases
            .into_iter()
            .map(|purchase| {
                let usage = usages.remove(&purchase.usage_id).ok_or_else(|| {
                    RepositoryError::DataCorruption(format!(
                        "purchase {} has no usage row",
                        purchase.id
                    ))
                })?;
                let payment = payments.remove(&purchase.id);
                let billing_events = events.remove(&purchase.id).unwrap_or_default();
                Ok(PurchaseWithDetails {
                    purchase,
                    usage,
                    payment,
                    billing_events,
                })
            })
            .collect()
    }

    /// Expired purchases for a shop, filtered, sorted, and paginated.
    ///
    /// The returned `total` counts all rows matching the filters, ignoring
    /// `limit`/`offset`, so callers can paginate independently.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn expired_page(
        &self,
        shop_id: ShopId,
        filter: &ExpiredPackageFilter,
    ) -> Result<ExpiredPackagePage, RepositoryError> {
        let mut count_query = QueryBuilder::new(
            r"
            SELECT COUNT(*)
            FROM ledger.credit_purchases p
            JOIN ledger.usages u ON u.id = p.usage_id
            ",
        );
        push_expired_filters(&mut count_query, shop_id, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(self.pool)
            .await?;

        let mut page_query = QueryBuilder::new(
            r"
            SELECT p.*, (u.ai_credits_used + u.crawl_credits_used) AS credits_used
            FROM ledger.credit_purchases p
            JOIN ledger.usages u ON u.id = p.usage_id
            ",
        );
        push_expired_filters(&mut page_query, shop_id, filter);
        // Sort column/direction come from closed enums, not caller strings.
        page_query.push(format!(
            " ORDER BY p.{} {} NULLS LAST",
            filter.sort_by.column(),
            filter.sort_order.sql()
        ));
        if let Some(limit) = filter.limit {
            page_query.push(" LIMIT ");
            page_query.push_bind(limit);
        }
        if let Some(offset) = filter.offset {
            page_query.push(" OFFSET ");
            page_query.push_bind(offset);
        }

        let rows = page_query.build().fetch_all(self.pool).await?;
        let packages = rows
            .iter()
            .map(|row| {
                Ok(ExpiredPackage {
                    purchase: purchase_from_row(row)?,
                    credits_used: row.try_get("credits_used")?,
                })
            })
            .collect::<Result<_, RepositoryError>>()?;

        Ok(ExpiredPackagePage { packages, total })
    }

    /// Expire every ACTIVE purchase whose consumed credits meet or exceed
    /// the snapshotted credit amount. Returns the number of purchases
    /// transitioned.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn expire_consumed(&self, shop_id: ShopId) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE ledger.credit_purchases p
            SET status = 'EXPIRED', expired_at = NOW(), updated_at = NOW()
            FROM ledger.usages u
            WHERE u.id = p.usage_id
              AND p.shop_id = $1
              AND p.status = 'ACTIVE'
              AND (u.ai_credits_used + u.crawl_credits_used)
                  >= (p.snapshot->>'credit_amount')::numeric
            ",
        )
        .bind(shop_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Insert a usage row on the caller's transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn insert_usage(
    conn: &mut PgConnection,
    usage: &NewUsage,
) -> Result<Usage, RepositoryError> {
    let ai = &usage.service_usage.ai;
    let crawl = &usage.service_usage.crawl;

    let row = sqlx::query(
        r"
        INSERT INTO ledger.usages
            (id, shop_id, associated_user_id, subscription_id, model_name,
             ai_total_requests, ai_requests_used, ai_requests_remaining,
             ai_total_credits, ai_credits_used, ai_credits_remaining,
             ai_input_tokens_used, ai_output_tokens_used,
             ai_minute_reset_at, ai_day_reset_at,
             crawl_total_requests, crawl_requests_used, crawl_requests_remaining,
             crawl_total_credits, crawl_credits_used, crawl_credits_remaining,
             crawl_input_tokens_used, crawl_output_tokens_used,
             crawl_minute_reset_at, crawl_day_reset_at)
        VALUES ($1, $2, $3, $4, $5,
                $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)
        RETURNING *
        ",
    )
    .bind(UsageId::generate())
    .bind(usage.shop_id)
    .bind(usage.associated_user_id)
    .bind(usage.subscription_id)
    .bind(&usage.model_name)
    .bind(ai.total_requests)
    .bind(ai.requests_used)
    .bind(ai.requests_remaining)
    .bind(ai.total_credits)
    .bind(ai.credits_used)
    .bind(ai.credits_remaining)
    .bind(ai.input_tokens_used)
    .bind(ai.output_tokens_used)
    .bind(ai.minute_reset_at)
    .bind(ai.day_reset_at)
    .bind(crawl.total_requests)
    .bind(crawl.requests_used)
    .bind(crawl.requests_remaining)
    .bind(crawl.total_credits)
    .bind(crawl.credits_used)
    .bind(crawl.credits_remaining)
    .bind(crawl.input_tokens_used)
    .bind(crawl.output_tokens_used)
    .bind(crawl.minute_reset_at)
    .bind(crawl.day_reset_at)
    .fetch_one(conn)
    .await?;

    usage_from_row(&row)
}

/// Insert the purchase row on the caller's transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` naming the violated constraint when
/// `shopify_purchase_id` (or another unique) collides.
pub async fn insert_purchase(
    conn: &mut PgConnection,
    purchase: &NewPurchase,
) -> Result<CreditPurchase, RepositoryError> {
    let row = sqlx::query(
        r"
        INSERT INTO ledger.credit_purchases
            (id, shop_id, package_id, usage_id, associated_user_id,
             shopify_purchase_id, snapshot, status, purchased_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'ACTIVE', $8)
        RETURNING *
        ",
    )
    .bind(PurchaseId::generate())
    .bind(purchase.shop_id)
    .bind(purchase.package_id)
    .bind(purchase.usage_id)
    .bind(purchase.associated_user_id)
    .bind(&purchase.shopify_purchase_id)
    .bind(Json(&purchase.snapshot))
    .bind(purchase.purchased_at)
    .fetch_one(conn)
    .await
    .map_err(RepositoryError::from_sqlx)?;

    purchase_from_row(&row)
}

/// Insert a payment row on the caller's transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` when `transaction_id` collides.
pub async fn insert_payment(
    conn: &mut PgConnection,
    payment: &NewPayment,
) -> Result<Payment, RepositoryError> {
    let row = sqlx::query(
        r"
        INSERT INTO ledger.payments
            (id, purchase_id, subscription_id, amount, adjusted_amount,
             currency, billing_type, status, transaction_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        ",
    )
    .bind(PaymentId::generate())
    .bind(payment.purchase_id)
    .bind(payment.subscription_id)
    .bind(payment.amount)
    .bind(payment.adjusted_amount)
    .bind(payment.currency.as_str())
    .bind(payment.billing_type.as_str())
    .bind(payment.status.as_str())
    .bind(&payment.transaction_id)
    .fetch_one(conn)
    .await
    .map_err(RepositoryError::from_sqlx)?;

    payment_from_row(&row)
}

/// Append a billing event on the caller's transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn insert_billing_event(
    conn: &mut PgConnection,
    event: &NewBillingEvent,
) -> Result<BillingEvent, RepositoryError> {
    let row = sqlx::query(
        r"
        INSERT INTO ledger.billing_events
            (id, purchase_id, kind, promotion_id, discount_id, amount, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        ",
    )
    .bind(BillingEventId::generate())
    .bind(event.purchase_id)
    .bind(event.kind.as_str())
    .bind(event.promotion_id)
    .bind(event.discount_id)
    .bind(event.amount)
    .bind(event.description.as_deref())
    .fetch_one(conn)
    .await?;

    billing_event_from_row(&row)
}

/// Record a gateway-reported payment status by transaction id, returning the
/// updated payment.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if no payment carries the id.
pub async fn set_payment_status_by_transaction(
    conn: &mut PgConnection,
    transaction_id: &str,
    status: PaymentStatus,
) -> Result<Payment, RepositoryError> {
    let row = sqlx::query(
        r"
        UPDATE ledger.payments
        SET status = $2, updated_at = NOW()
        WHERE transaction_id = $1
        RETURNING *
        ",
    )
    .bind(transaction_id)
    .bind(status.as_str())
    .fetch_optional(conn)
    .await?
    .ok_or(RepositoryError::NotFound)?;

    payment_from_row(&row)
}

/// Set a purchase's lifecycle status on the caller's transaction.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the purchase doesn't exist.
pub async fn set_purchase_status(
    conn: &mut PgConnection,
    id: PurchaseId,
    status: PurchaseStatus,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE ledger.credit_purchases
        SET status = $2, updated_at = NOW()
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(status.as_str())
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }

    Ok(())
}

/// Record AI consumption against a subscription's usage row: credits,
/// tokens, and one request, keeping the request-count invariant intact.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the subscription has no usage row.
pub async fn record_subscription_ai_usage(
    conn: &mut PgConnection,
    subscription_id: SubscriptionId,
    credits: Decimal,
    model_name: &str,
    input_tokens: i64,
    output_tokens: i64,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE ledger.usages
        SET ai_credits_used = ai_credits_used + $2,
            ai_credits_remaining = GREATEST(ai_credits_remaining - $2, 0),
            ai_requests_used = ai_requests_used
                + CASE WHEN ai_requests_remaining > 0 THEN 1 ELSE 0 END,
            ai_requests_remaining = ai_requests_remaining
                - CASE WHEN ai_requests_remaining > 0 THEN 1 ELSE 0 END,
            ai_input_tokens_used = ai_input_tokens_used + $4,
            ai_output_tokens_used = ai_output_tokens_used + $5,
            model_name = $3,
            updated_at = NOW()
        WHERE subscription_id = $1
        ",
    )
    .bind(subscription_id)
    .bind(credits)
    .bind(model_name)
    .bind(input_tokens)
    .bind(output_tokens)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }

    Ok(())
}

fn push_expired_filters(
    query: &mut QueryBuilder<'_, sqlx::Postgres>,
    shop_id: ShopId,
    filter: &ExpiredPackageFilter,
) {
    query.push(" WHERE p.shop_id = ");
    query.push_bind(shop_id);
    query.push(" AND p.status = 'EXPIRED'");

    if let Some(created_after) = filter.created_after {
        query.push(" AND p.created_at >= ");
        query.push_bind(created_after);
    }
    if let Some(created_before) = filter.created_before {
        query.push(" AND p.created_at <= ");
        query.push_bind(created_before);
    }
    if let Some(min) = filter.min_credits_used {
        query.push(" AND (u.ai_credits_used + u.crawl_credits_used) >= ");
        query.push_bind(min);
    }
    if let Some(max) = filter.max_credits_used {
        query.push(" AND (u.ai_credits_used + u.crawl_credits_used) <= ");
        query.push_bind(max);
    }
    if let Some(package_id) = filter.package_id {
        query.push(" AND p.package_id = ");
        query.push_bind(package_id);
    }
}

pub(crate) fn purchase_from_row(row: &PgRow) -> Result<CreditPurchase, RepositoryError> {
    let status: String = row.try_get("status")?;
    let Json(snapshot): Json<PackageSnapshot> = row.try_get("snapshot")?;

    Ok(CreditPurchase {
        id: row.try_get("id")?,
        shop_id: row.try_get("shop_id")?,
        package_id: row.try_get("package_id")?,
        usage_id: row.try_get("usage_id")?,
        associated_user_id: row.try_get("associated_user_id")?,
        shopify_purchase_id: row.try_get("shopify_purchase_id")?,
        snapshot,
        status: decode_stored(&status)?,
        purchased_at: row.try_get("purchased_at")?,
        expired_at: row.try_get("expired_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn usage_from_row(row: &PgRow) -> Result<Usage, RepositoryError> {
    Ok(Usage {
        id: row.try_get("id")?,
        shop_id: row.try_get("shop_id")?,
        associated_user_id: row.try_get("associated_user_id")?,
        subscription_id: row.try_get("subscription_id")?,
        model_name: row.try_get("model_name")?,
        service_usage: ServiceUsage {
            ai: crate::models::ServiceUsageDetails {
                total_requests: row.try_get("ai_total_requests")?,
                requests_used: row.try_get("ai_requests_used")?,
                requests_remaining: row.try_get("ai_requests_remaining")?,
                total_credits: row.try_get("ai_total_credits")?,
                credits_used: row.try_get("ai_credits_used")?,
                credits_remaining: row.try_get("ai_credits_remaining")?,
                input_tokens_used: row.try_get("ai_input_tokens_used")?,
                output_tokens_used: row.try_get("ai_output_tokens_used")?,
                minute_reset_at: row.try_get("ai_minute_reset_at")?,
                day_reset_at: row.try_get("ai_day_reset_at")?,
            },
            crawl: crate::models::ServiceUsageDetails {
                total_requests: row.try_get("crawl_total_requests")?,
                requests_used: row.try_get("crawl_requests_used")?,
                requests_remaining: row.try_get("crawl_requests_remaining")?,
                total_credits: row.try_get("crawl_total_credits")?,
                credits_used: row.try_get("crawl_credits_used")?,
                credits_remaining: row.try_get("crawl_credits_remaining")?,
                input_tokens_used: row.try_get("crawl_input_tokens_used")?,
                output_tokens_used: row.try_get("crawl_output_tokens_used")?,
                minute_reset_at: row.try_get("crawl_minute_reset_at")?,
                day_reset_at: row.try_get("crawl_day_reset_at")?,
            },
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn payment_from_row(row: &PgRow) -> Result<Payment, RepositoryError> {
    let currency: String = row.try_get("currency")?;
    let billing_type: String = row.try_get("billing_type")?;
    let status: String = row.try_get("status")?;

    Ok(Payment {
        id: row.try_get("id")?,
        purchase_id: row.try_get("purchase_id")?,
        subscription_id: row.try_get("subscription_id")?,
        amount: row.try_get("amount")?,
        adjusted_amount: row.try_get("adjusted_amount")?,
        currency: decode_stored(&currency)?,
        billing_type: decode_stored(&billing_type)?,
        status: decode_stored(&status)?,
        transaction_id: row.try_get("transaction_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn billing_event_from_row(row: &PgRow) -> Result<BillingEvent, RepositoryError> {
    let kind: String = row.try_get("kind")?;

    Ok(BillingEvent {
        id: row.try_get("id")?,
        purchase_id: row.try_get("purchase_id")?,
        kind: decode_stored(&kind)?,
        promotion_id: row.try_get("promotion_id")?,
        discount_id: row.try_get("discount_id")?,
        amount: row.try_get("amount")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}
