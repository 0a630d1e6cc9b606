//! Shop and associated-user repository.
//!
//! Shops are created on first session storage and deleted on uninstall
//! cleanup. Associated users (Shopify staff accounts) are upserted
//! idempotently keyed by `(shop_id, external_user_id)`.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use storescribe_core::{AssociatedUserId, Email, ShopId};

use super::{RepositoryError, decode_email};
use crate::models::{AssociatedUser, Shop};

/// Repository for shop and staff-account operations.
pub struct ShopRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ShopRepository<'a> {
    /// Create a new shop repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Look up a shop by its `myshopify.com` domain.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_domain(&self, domain: &str) -> Result<Option<Shop>, RepositoryError> {
        let row = sqlx::query(
            r"
            SELECT id, domain, name, email, created_at, updated_at
            FROM ledger.shops
            WHERE domain = $1
            ",
        )
        .bind(domain)
        .fetch_optional(self.pool)
        .await?;

        row.as_ref().map(shop_from_row).transpose()
    }

    /// Create or refresh a shop row keyed by domain.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert(
        &self,
        domain: &str,
        name: Option<&str>,
        email: Option<&Email>,
    ) -> Result<Shop, RepositoryError> {
        let row = sqlx::query(
            r"
            INSERT INTO ledger.shops (id, domain, name, email)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (domain) DO UPDATE
                SET name = COALESCE(EXCLUDED.name, ledger.shops.name),
                    email = COALESCE(EXCLUDED.email, ledger.shops.email),
                    updated_at = NOW()
            RETURNING id, domain, name, email, created_at, updated_at
            ",
        )
        .bind(ShopId::generate())
        .bind(domain)
        .bind(name)
        .bind(email)
        .fetch_one(self.pool)
        .await?;

        shop_from_row(&row)
    }

    /// Delete a shop (uninstall cleanup). Usage, purchase, and payment rows
    /// cascade.
    ///
    /// # Returns
    ///
    /// `true` if a shop was deleted, `false` if none existed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, domain: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM ledger.shops WHERE domain = $1")
            .bind(domain)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Staff users with a currently active online session for the shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_current_associated_users(
        &self,
        shop_id: ShopId,
    ) -> Result<Vec<AssociatedUser>, RepositoryError> {
        let rows = sqlx::query(
            r"
            SELECT id, shop_id, external_user_id, email, first_name, last_name,
                   session_active, last_seen_at, created_at, updated_at
            FROM ledger.associated_users
            WHERE shop_id = $1 AND session_active
            ORDER BY last_seen_at DESC
            ",
        )
        .bind(shop_id)
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(associated_user_from_row).collect()
    }

    /// Look up a staff user by email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_associated_user_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<AssociatedUser>, RepositoryError> {
        let row = sqlx::query(
            r"
            SELECT id, shop_id, external_user_id, email, first_name, last_name,
                   session_active, last_seen_at, created_at, updated_at
            FROM ledger.associated_users
            WHERE email = $1
            ORDER BY last_seen_at DESC
            LIMIT 1
            ",
        )
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        row.as_ref().map(associated_user_from_row).transpose()
    }

    /// Create or refresh a staff user keyed by the external Shopify user id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert_associated_user(
        &self,
        shop_id: ShopId,
        external_user_id: i64,
        email: Option<&Email>,
        first_name: Option<&str>,
        last_name: Option<&str>,
        session_active: bool,
    ) -> Result<AssociatedUser, RepositoryError> {
        let row = sqlx::query(
            r"
            INSERT INTO ledger.associated_users
                (id, shop_id, external_user_id, email, first_name, last_name,
                 session_active, last_seen_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (shop_id, external_user_id) DO UPDATE
                SET email = COALESCE(EXCLUDED.email, ledger.associated_users.email),
                    first_name = COALESCE(EXCLUDED.first_name, ledger.associated_users.first_name),
                    last_name = COALESCE(EXCLUDED.last_name, ledger.associated_users.last_name),
                    session_active = EXCLUDED.session_active,
                    last_seen_at = NOW(),
                    updated_at = NOW()
            RETURNING id, shop_id, external_user_id, email, first_name, last_name,
                      session_active, last_seen_at, created_at, updated_at
            ",
        )
        .bind(AssociatedUserId::generate())
        .bind(shop_id)
        .bind(external_user_id)
        .bind(email)
        .bind(first_name)
        .bind(last_name)
        .bind(session_active)
        .fetch_one(self.pool)
        .await?;

        associated_user_from_row(&row)
    }
}

fn shop_from_row(row: &PgRow) -> Result<Shop, RepositoryError> {
    Ok(Shop {
        id: row.try_get("id")?,
        domain: row.try_get("domain")?,
        name: row.try_get("name")?,
        email: decode_email(row.try_get("email")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn associated_user_from_row(row: &PgRow) -> Result<AssociatedUser, RepositoryError> {
    Ok(AssociatedUser {
        id: row.try_get("id")?,
        shop_id: row.try_get("shop_id")?,
        external_user_id: row.try_get("external_user_id")?,
        email: decode_email(row.try_get("email")?)?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        session_active: row.try_get("session_active")?,
        last_seen_at: row.try_get("last_seen_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
