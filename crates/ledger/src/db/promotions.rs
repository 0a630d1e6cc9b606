//! Promotion and discount repository.
//!
//! Applicability is a pure predicate over the catalog row: active, inside
//! its time window, under `max_uses`, and scoped to the shop and/or package
//! (NULL scope matches everything). Use counters are incremented inside the
//! purchase transaction so an aborted purchase never consumes a use.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};

use storescribe_core::{AdjustmentKind, DiscountId, PackageId, PromotionId, ShopId};

use super::{RepositoryError, decode_stored};
use crate::models::{Discount, Promotion};

/// Fields for a new promotion or discount row.
#[derive(Debug, Clone)]
pub struct NewAdjustment {
    pub code: String,
    pub name: String,
    pub kind: AdjustmentKind,
    pub value: Decimal,
    pub shop_id: Option<ShopId>,
    pub package_id: Option<PackageId>,
    pub starts_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i64>,
}

const APPLICABLE_WHERE: &str = r"
    WHERE is_active
      AND starts_at <= $3
      AND (expires_at IS NULL OR expires_at > $3)
      AND (shop_id IS NULL OR shop_id = $1)
      AND (package_id IS NULL OR package_id = $2)
      AND (max_uses IS NULL OR used_count < max_uses)
    ORDER BY created_at ASC
";

/// Repository for promotion/discount catalog operations.
pub struct PromotionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PromotionRepository<'a> {
    /// Create a new promotion repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Promotions applicable to this shop and package right now.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn applicable_promotions(
        &self,
        shop_id: ShopId,
        package_id: PackageId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Promotion>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM ledger.promotions {APPLICABLE_WHERE}"
        ))
        .bind(shop_id)
        .bind(package_id)
        .bind(now)
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(promotion_from_row).collect()
    }

    /// Discounts applicable to this shop and package right now.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn applicable_discounts(
        &self,
        shop_id: ShopId,
        package_id: PackageId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Discount>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM ledger.discounts {APPLICABLE_WHERE}"
        ))
        .bind(shop_id)
        .bind(package_id)
        .bind(now)
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(discount_from_row).collect()
    }

    /// Create a promotion.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the code already exists.
    pub async fn insert_promotion(
        &self,
        adjustment: &NewAdjustment,
    ) -> Result<Promotion, RepositoryError> {
        let row = insert_adjustment(self.pool, "promotions", PromotionId::generate().as_uuid(), adjustment)
            .await?;
        promotion_from_row(&row)
    }

    /// Create a discount.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the code already exists.
    pub async fn insert_discount(
        &self,
        adjustment: &NewAdjustment,
    ) -> Result<Discount, RepositoryError> {
        let row = insert_adjustment(self.pool, "discounts", DiscountId::generate().as_uuid(), adjustment)
            .await?;
        discount_from_row(&row)
    }
}

/// Increment a promotion's use counter. Runs on the purchase transaction's
/// connection so the increment rolls back with the purchase.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the promotion doesn't exist.
pub async fn increment_promotion_use(
    conn: &mut PgConnection,
    id: PromotionId,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE ledger.promotions
        SET used_count = used_count + 1, updated_at = NOW()
        WHERE id = $1
        ",
    )
    .bind(id)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }

    Ok(())
}

/// Increment a discount's use counter on the purchase transaction.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the discount doesn't exist.
pub async fn increment_discount_use(
    conn: &mut PgConnection,
    id: DiscountId,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE ledger.discounts
        SET used_count = used_count + 1, updated_at = NOW()
        WHERE id = $1
        ",
    )
    .bind(id)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }

    Ok(())
}

async fn insert_adjustment(
    pool: &PgPool,
    table: &str,
    id: uuid::Uuid,
    adjustment: &NewAdjustment,
) -> Result<PgRow, RepositoryError> {
    sqlx::query(&format!(
        r"
        INSERT INTO ledger.{table}
            (id, code, name, kind, value, shop_id, package_id,
             starts_at, expires_at, max_uses)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "
    ))
    .bind(id)
    .bind(&adjustment.code)
    .bind(&adjustment.name)
    .bind(adjustment.kind.as_str())
    .bind(adjustment.value)
    .bind(adjustment.shop_id)
    .bind(adjustment.package_id)
    .bind(adjustment.starts_at)
    .bind(adjustment.expires_at)
    .bind(adjustment.max_uses)
    .fetch_one(pool)
    .await
    .map_err(RepositoryError::from_sqlx)
}

fn promotion_from_row(row: &PgRow) -> Result<Promotion, RepositoryError> {
    let kind: String = row.try_get("kind")?;

    Ok(Promotion {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        kind: decode_stored(&kind)?,
        value: row.try_get("value")?,
        shop_id: row.try_get("shop_id")?,
        package_id: row.try_get("package_id")?,
        starts_at: row.try_get("starts_at")?,
        expires_at: row.try_get("expires_at")?,
        max_uses: row.try_get("max_uses")?,
        used_count: row.try_get("used_count")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn discount_from_row(row: &PgRow) -> Result<Discount, RepositoryError> {
    let kind: String = row.try_get("kind")?;

    Ok(Discount {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        kind: decode_stored(&kind)?,
        value: row.try_get("value")?,
        shop_id: row.try_get("shop_id")?,
        package_id: row.try_get("package_id")?,
        starts_at: row.try_get("starts_at")?,
        expires_at: row.try_get("expires_at")?,
        max_uses: row.try_get("max_uses")?,
        used_count: row.try_get("used_count")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
