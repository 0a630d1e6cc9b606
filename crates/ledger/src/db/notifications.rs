//! Notification outbox repository.
//!
//! Rows are written inside the purchase transaction; delivery happens after
//! commit and records its outcome with `mark_sent` / `mark_failed`.

use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};

use storescribe_core::{Email, NotificationId, PurchaseId, ShopId};

use super::{RepositoryError, decode_email, decode_stored};
use crate::models::Notification;

/// Fields for a new outbox row.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub shop_id: ShopId,
    pub purchase_id: Option<PurchaseId>,
    pub topic: String,
    pub recipient: Option<Email>,
}

/// Repository for notification outcome updates and reads.
pub struct NotificationRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> NotificationRepository<'a> {
    /// Create a new notification repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record a successful delivery.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the notification doesn't exist.
    pub async fn mark_sent(&self, id: NotificationId) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE ledger.notifications
            SET status = 'SENT', sent_at = NOW(), error = NULL
            WHERE id = $1
            ",
        )
        .bind(id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    /// Record a failed delivery attempt with its reason.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the notification doesn't exist.
    pub async fn mark_failed(&self, id: NotificationId, error: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE ledger.notifications
            SET status = 'FAILED', error = $2
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(error)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    /// Undelivered notifications, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_pending(&self) -> Result<Vec<Notification>, RepositoryError> {
        let rows = sqlx::query(
            r"
            SELECT * FROM ledger.notifications
            WHERE status = 'PENDING'
            ORDER BY created_at ASC
            ",
        )
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(notification_from_row).collect()
    }
}

/// Insert a PENDING outbox row on the caller's transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn insert_notification(
    conn: &mut PgConnection,
    notification: &NewNotification,
) -> Result<Notification, RepositoryError> {
    let row = sqlx::query(
        r"
        INSERT INTO ledger.notifications
            (id, shop_id, purchase_id, topic, recipient, status)
        VALUES ($1, $2, $3, $4, $5, 'PENDING')
        RETURNING *
        ",
    )
    .bind(NotificationId::generate())
    .bind(notification.shop_id)
    .bind(notification.purchase_id)
    .bind(&notification.topic)
    .bind(notification.recipient.as_ref().map(Email::as_str))
    .fetch_one(conn)
    .await?;

    notification_from_row(&row)
}

fn notification_from_row(row: &PgRow) -> Result<Notification, RepositoryError> {
    let status: String = row.try_get("status")?;
    let recipient: Option<String> = row.try_get("recipient")?;

    Ok(Notification {
        id: row.try_get("id")?,
        shop_id: row.try_get("shop_id")?,
        purchase_id: row.try_get("purchase_id")?,
        topic: row.try_get("topic")?,
        recipient: decode_email(recipient)?,
        status: decode_stored(&status)?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        sent_at: row.try_get("sent_at")?,
    })
}
