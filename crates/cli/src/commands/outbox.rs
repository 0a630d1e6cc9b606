//! Notification outbox inspection.

use storescribe_ledger::db::NotificationRepository;
use storescribe_ledger::{LedgerConfig, db};

/// List undelivered notification outbox rows, oldest first.
///
/// # Errors
///
/// Returns an error if the database is unreachable.
pub async fn pending(config: &LedgerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let pool = db::create_pool(&config.database_url).await?;

    let pending = NotificationRepository::new(&pool).find_pending().await?;

    #[allow(clippy::print_stdout)]
    {
        if pending.is_empty() {
            println!("No pending notifications");
        } else {
            println!("{:<38} {:<20} {:<30} CREATED", "ID", "TOPIC", "RECIPIENT");
            for notification in &pending {
                let recipient = notification
                    .recipient
                    .as_ref()
                    .map_or("-", storescribe_core::Email::as_str);
                println!(
                    "{:<38} {:<20} {:<30} {}",
                    notification.id,
                    notification.topic,
                    recipient,
                    notification.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
    }

    Ok(())
}
