//! Database operations for the ledger `PostgreSQL` schema.
//!
//! # Schema: `ledger`
//!
//! ## Tables
//!
//! - `shops` - Tenant identity
//! - `associated_users` - Shopify staff accounts per shop
//! - `subscriptions` - Per-shop drawable credit balances
//! - `credit_packages` - Catalog entries with per-service limits
//! - `usages` - Per-purchase consumption counters (AI / Crawl)
//! - `credit_purchases` - Purchases with JSONB package snapshots
//! - `payments` - One per purchase or subscription
//! - `billing_events` - Append-only promotion/discount audit log
//! - `promotions`, `discounts` - Price adjustment catalogs
//! - `notifications` - Post-commit email outbox
//!
//! # Migrations
//!
//! Embedded from `crates/ledger/migrations/` and run via:
//! ```bash
//! cargo run -p storescribe-cli -- migrate
//! ```
//!
//! Queries use the runtime-checked sqlx API (explicit binds, explicit row
//! decoding) so the workspace builds without a reachable database.

pub mod notifications;
pub mod packages;
pub mod promotions;
pub mod purchases;
pub mod shops;
pub mod subscriptions;
pub mod tx;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use notifications::NotificationRepository;
pub use packages::{NewPackage, PackageRepository};
pub use promotions::{NewAdjustment, PromotionRepository};
pub use purchases::{
    ExpiredPackageFilter, ExpiredPackagePage, PurchaseRepository, PurchaseSortKey,
    PurchaseWithDetails, SortOrder,
};
pub use shops::ShopRepository;
pub use subscriptions::SubscriptionRepository;
pub use tx::run_serializable;

/// Embedded migrations for the ledger schema.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation; carries the violated constraint or field name.
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Translate a sqlx error, turning unique violations into
    /// [`Self::Conflict`] named after the violated constraint.
    #[must_use]
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            let field = db_err
                .constraint()
                .map_or_else(|| "unique constraint".to_owned(), str::to_owned);
            return Self::Conflict(field);
        }
        Self::Database(err)
    }
}

/// Decode a stored status/enum string, reporting unknown values as data
/// corruption rather than panicking.
pub(crate) fn decode_stored<T>(value: &str) -> Result<T, RepositoryError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| RepositoryError::DataCorruption(e.to_string()))
}

/// Decode an optional stored email column.
pub(crate) fn decode_email(
    value: Option<String>,
) -> Result<Option<storescribe_core::Email>, RepositoryError> {
    value
        .map(|raw| {
            storescribe_core::Email::parse(&raw).map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
            })
        })
        .transpose()
}

/// Create a `PostgreSQL` connection pool with ledger defaults.
///
/// The 5 second acquire timeout doubles as the maximum wait for a
/// transaction slot; statement timeouts are set per-transaction by
/// [`tx::run_serializable`].
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url.expose_secret())
        .await
}
