//! Subscription repository.
//!
//! A subscription carries the shop's drawable credit balance. Balance
//! mutations happen on the caller's serializable transaction; the schema
//! additionally enforces that the balance never goes negative.

use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};

use storescribe_core::{ShopId, SubscriptionId};

use super::RepositoryError;
use crate::models::Subscription;

/// Repository for subscription operations.
pub struct SubscriptionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SubscriptionRepository<'a> {
    /// Create a new subscription repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a subscription with an initial balance.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(
        &self,
        shop_id: ShopId,
        plan_name: &str,
        initial_balance: Decimal,
    ) -> Result<Subscription, RepositoryError> {
        let row = sqlx::query(
            r"
            INSERT INTO ledger.subscriptions (id, shop_id, plan_name, credit_balance)
            VALUES ($1, $2, $3, $4)
            RETURNING id, shop_id, plan_name, credit_balance, is_active,
                      created_at, updated_at
            ",
        )
        .bind(SubscriptionId::generate())
        .bind(shop_id)
        .bind(plan_name)
        .bind(initial_balance)
        .fetch_one(self.pool)
        .await?;

        subscription_from_row(&row)
    }

    /// The shop's active subscription, if any (newest first on ties).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_active_by_shop(
        &self,
        shop_id: ShopId,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let row = sqlx::query(
            r"
            SELECT id, shop_id, plan_name, credit_balance, is_active,
                   created_at, updated_at
            FROM ledger.subscriptions
            WHERE shop_id = $1 AND is_active
            ORDER BY created_at DESC
            LIMIT 1
            ",
        )
        .bind(shop_id)
        .fetch_optional(self.pool)
        .await?;

        row.as_ref().map(subscription_from_row).transpose()
    }
}

/// The shop's active subscription, read on the caller's transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn find_active_by_shop_tx(
    conn: &mut PgConnection,
    shop_id: ShopId,
) -> Result<Option<Subscription>, RepositoryError> {
    let row = sqlx::query(
        r"
        SELECT id, shop_id, plan_name, credit_balance, is_active,
               created_at, updated_at
        FROM ledger.subscriptions
        WHERE shop_id = $1 AND is_active
        ORDER BY created_at DESC
        LIMIT 1
        ",
    )
    .bind(shop_id)
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(subscription_from_row).transpose()
}

/// Decrement a subscription's balance on the caller's transaction.
///
/// The caller is responsible for the sufficient-balance check; this only
/// performs the write.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the subscription doesn't exist.
pub async fn decrement_balance(
    conn: &mut PgConnection,
    id: SubscriptionId,
    amount: Decimal,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE ledger.subscriptions
        SET credit_balance = credit_balance - $2, updated_at = NOW()
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(amount)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }

    Ok(())
}

fn subscription_from_row(row: &PgRow) -> Result<Subscription, RepositoryError> {
    Ok(Subscription {
        id: row.try_get("id")?,
        shop_id: row.try_get("shop_id")?,
        plan_name: row.try_get("plan_name")?,
        credit_balance: row.try_get("credit_balance")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
