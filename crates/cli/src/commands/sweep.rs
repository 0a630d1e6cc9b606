//! Purchase expiry sweep.

use storescribe_ledger::services::{PurchaseService, StandardBillingOperations};
use storescribe_ledger::{LedgerConfig, db};

/// Expire every fully consumed ACTIVE purchase for one shop.
///
/// # Errors
///
/// Returns an error if the shop is unknown or the database is unreachable.
pub async fn run(config: &LedgerConfig, shop: &str) -> Result<(), Box<dyn std::error::Error>> {
    let pool = db::create_pool(&config.database_url).await?;

    let billing = StandardBillingOperations;
    let service = PurchaseService::new(&pool, &billing, None, &config.default_model);
    let expired = service.check_and_update_package_status(shop).await?;

    tracing::info!(shop = %shop, expired, "Sweep complete");
    Ok(())
}
