//! Standard catalog seeding.

use storescribe_ledger::services::CatalogService;
use storescribe_ledger::{LedgerConfig, db};

/// Seed or refresh the standard credit package catalog. Safe to run
/// repeatedly; packages are upserted by name.
///
/// # Errors
///
/// Returns an error if the database is unreachable or an upsert fails.
pub async fn run(config: &LedgerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let pool = db::create_pool(&config.database_url).await?;

    let packages = CatalogService::new(&pool)
        .create_standard_credit_packages()
        .await?;

    for package in &packages {
        tracing::info!(
            name = %package.name,
            credits = %package.credit_amount,
            total_price = %package.total_price,
            "Seeded package"
        );
    }
    tracing::info!("Standard catalog seeded ({} packages)", packages.len());

    Ok(())
}
