//! Ledger database migrations.
//!
//! Migrations are embedded in the `storescribe-ledger` crate and applied
//! against `LEDGER_DATABASE_URL`.

use storescribe_ledger::{LedgerConfig, db};

/// Apply all pending ledger migrations.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn run(config: &LedgerConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Connecting to ledger database...");
    let pool = db::create_pool(&config.database_url).await?;

    tracing::info!("Running ledger migrations...");
    db::MIGRATOR.run(&pool).await?;

    tracing::info!("Ledger migrations complete");
    Ok(())
}
