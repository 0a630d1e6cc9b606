//! Credit package catalog repository.

use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use storescribe_core::{CurrencyCode, PackageId};

use super::{RepositoryError, decode_stored};
use crate::models::{AiFeature, CrawlFeature, CreditPackage, Feature, RateLimits};

/// Fields for a catalog row to be inserted or upserted.
#[derive(Debug, Clone)]
pub struct NewPackage {
    pub name: String,
    pub credit_amount: Decimal,
    pub price_per_credit: Decimal,
    pub total_price: Decimal,
    pub currency: CurrencyCode,
    pub is_custom: bool,
    pub feature: Feature,
}

/// Repository for credit package catalog operations.
pub struct PackageRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PackageRepository<'a> {
    /// Create a new package repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Idempotently create or refresh a standard package, keyed by name.
    ///
    /// A second call with the same name overwrites the pricing and limit
    /// columns instead of inserting a duplicate.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert_by_name(&self, package: &NewPackage) -> Result<CreditPackage, RepositoryError> {
        let row = sqlx::query(
            r"
            INSERT INTO ledger.credit_packages
                (id, name, credit_amount, price_per_credit, total_price, currency,
                 is_custom, is_active,
                 ai_request_limit, ai_token_limit, ai_credit_limit,
                 ai_rpm, ai_rpd, ai_tpm, ai_tpd,
                 crawl_request_limit, crawl_credit_limit,
                 crawl_rpm, crawl_rpd, crawl_tpm, crawl_tpd)
            VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE,
                    $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, $18, $19, $20)
            ON CONFLICT (name) DO UPDATE SET
                credit_amount = EXCLUDED.credit_amount,
                price_per_credit = EXCLUDED.price_per_credit,
                total_price = EXCLUDED.total_price,
                currency = EXCLUDED.currency,
                is_active = TRUE,
                ai_request_limit = EXCLUDED.ai_request_limit,
                ai_token_limit = EXCLUDED.ai_token_limit,
                ai_credit_limit = EXCLUDED.ai_credit_limit,
                ai_rpm = EXCLUDED.ai_rpm,
                ai_rpd = EXCLUDED.ai_rpd,
                ai_tpm = EXCLUDED.ai_tpm,
                ai_tpd = EXCLUDED.ai_tpd,
                crawl_request_limit = EXCLUDED.crawl_request_limit,
                crawl_credit_limit = EXCLUDED.crawl_credit_limit,
                crawl_rpm = EXCLUDED.crawl_rpm,
                crawl_rpd = EXCLUDED.crawl_rpd,
                crawl_tpm = EXCLUDED.crawl_tpm,
                crawl_tpd = EXCLUDED.crawl_tpd,
                updated_at = NOW()
            RETURNING *
            ",
        )
        .bind(PackageId::generate())
        .bind(&package.name)
        .bind(package.credit_amount)
        .bind(package.price_per_credit)
        .bind(package.total_price)
        .bind(package.currency.as_str())
        .bind(package.is_custom)
        .bind(package.feature.ai.request_limit)
        .bind(package.feature.ai.token_limit)
        .bind(package.feature.ai.credit_limit)
        .bind(package.feature.ai.rate.rpm)
        .bind(package.feature.ai.rate.rpd)
        .bind(package.feature.ai.rate.tpm)
        .bind(package.feature.ai.rate.tpd)
        .bind(package.feature.crawl.request_limit)
        .bind(package.feature.crawl.credit_limit)
        .bind(package.feature.crawl.rate.rpm)
        .bind(package.feature.crawl.rate.rpd)
        .bind(package.feature.crawl.rate.tpm)
        .bind(package.feature.crawl.rate.tpd)
        .fetch_one(self.pool)
        .await?;

        package_from_row(&row)
    }

    /// Insert a custom package. The unique timestamped name makes duplicate
    /// inserts a conflict rather than an upsert.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name already exists, or
    /// `RepositoryError::Database` for other failures.
    pub async fn insert_custom(&self, package: &NewPackage) -> Result<CreditPackage, RepositoryError> {
        let row = sqlx::query(
            r"
            INSERT INTO ledger.credit_packages
                (id, name, credit_amount, price_per_credit, total_price, currency,
                 is_custom, is_active,
                 ai_request_limit, ai_token_limit, ai_credit_limit,
                 ai_rpm, ai_rpd, ai_tpm, ai_tpd,
                 crawl_request_limit, crawl_credit_limit,
                 crawl_rpm, crawl_rpd, crawl_tpm, crawl_tpd)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, TRUE,
                    $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19)
            RETURNING *
            ",
        )
        .bind(PackageId::generate())
        .bind(&package.name)
        .bind(package.credit_amount)
        .bind(package.price_per_credit)
        .bind(package.total_price)
        .bind(package.currency.as_str())
        .bind(package.feature.ai.request_limit)
        .bind(package.feature.ai.token_limit)
        .bind(package.feature.ai.credit_limit)
        .bind(package.feature.ai.rate.rpm)
        .bind(package.feature.ai.rate.rpd)
        .bind(package.feature.ai.rate.tpm)
        .bind(package.feature.ai.rate.tpd)
        .bind(package.feature.crawl.request_limit)
        .bind(package.feature.crawl.credit_limit)
        .bind(package.feature.crawl.rate.rpm)
        .bind(package.feature.crawl.rate.rpd)
        .bind(package.feature.crawl.rate.tpm)
        .bind(package.feature.crawl.rate.tpd)
        .fetch_one(self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        package_from_row(&row)
    }

    /// Active, non-custom packages ordered by credit amount ascending.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn all_standard(&self) -> Result<Vec<CreditPackage>, RepositoryError> {
        let rows = sqlx::query(
            r"
            SELECT * FROM ledger.credit_packages
            WHERE is_active AND NOT is_custom
            ORDER BY credit_amount ASC
            ",
        )
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(package_from_row).collect()
    }

    /// Look up a package by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_id(
        &self,
        id: PackageId,
    ) -> Result<Option<CreditPackage>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM ledger.credit_packages WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        row.as_ref().map(package_from_row).transpose()
    }

    /// Look up a package by its unique name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_name(
        &self,
        name: &str,
    ) -> Result<Option<CreditPackage>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM ledger.credit_packages WHERE name = $1")
            .bind(name)
            .fetch_optional(self.pool)
            .await?;

        row.as_ref().map(package_from_row).transpose()
    }

    /// Update a standard package's total price. Existing purchases keep
    /// their snapshotted price.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the package doesn't exist.
    pub async fn update_total_price(
        &self,
        id: PackageId,
        total_price: Decimal,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE ledger.credit_packages
            SET total_price = $2, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(total_price)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }
}

pub(crate) fn package_from_row(row: &PgRow) -> Result<CreditPackage, RepositoryError> {
    let currency: String = row.try_get("currency")?;

    Ok(CreditPackage {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        credit_amount: row.try_get("credit_amount")?,
        price_per_credit: row.try_get("price_per_credit")?,
        total_price: row.try_get("total_price")?,
        currency: decode_stored(&currency)?,
        is_custom: row.try_get("is_custom")?,
        is_active: row.try_get("is_active")?,
        feature: Feature {
            ai: AiFeature {
                request_limit: row.try_get("ai_request_limit")?,
                token_limit: row.try_get("ai_token_limit")?,
                credit_limit: row.try_get("ai_credit_limit")?,
                rate: RateLimits {
                    rpm: row.try_get("ai_rpm")?,
                    rpd: row.try_get("ai_rpd")?,
                    tpm: row.try_get("ai_tpm")?,
                    tpd: row.try_get("ai_tpd")?,
                },
            },
            crawl: CrawlFeature {
                request_limit: row.try_get("crawl_request_limit")?,
                credit_limit: row.try_get("crawl_credit_limit")?,
                rate: RateLimits {
                    rpm: row.try_get("crawl_rpm")?,
                    rpd: row.try_get("crawl_rpd")?,
                    tpm: row.try_get("crawl_tpm")?,
                    tpd: row.try_get("crawl_tpd")?,
                },
            },
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
