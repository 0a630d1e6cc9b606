//! Serializable transaction wrapper with bounded retry.
//!
//! Every multi-step ledger mutation runs through [`run_serializable`]. Under
//! Serializable isolation Postgres may abort one of two contending
//! transactions with SQLSTATE `40001` (or `40P01` on deadlock); the wrapper
//! absorbs those aborts with exponential backoff instead of surfacing a raw
//! database error to callers.

use std::time::Duration;

use futures::future::BoxFuture;
use rand::Rng;
use sqlx::{PgConnection, PgPool};
use tracing::warn;

use crate::error::LedgerError;

/// Maximum attempts per transaction, including the first.
const MAX_ATTEMPTS: u32 = 4;

/// Base backoff before the second attempt; doubles each retry, ±50% jitter.
const BASE_BACKOFF: Duration = Duration::from_millis(25);

/// Per-transaction statement timeout.
const STATEMENT_TIMEOUT: &str = "50s";

/// Run `op` inside a Serializable transaction, retrying serialization
/// conflicts up to [`MAX_ATTEMPTS`] times.
///
/// The closure receives the transaction's connection; returning `Ok` commits,
/// returning `Err` rolls back. The closure may run several times, so it must
/// not have side effects outside the transaction.
///
/// # Errors
///
/// Returns the closure's error once retries are exhausted (or immediately
/// for non-retryable errors), or a [`LedgerError::Repository`] for
/// begin/commit failures.
pub async fn run_serializable<T, F>(pool: &PgPool, mut op: F) -> Result<T, LedgerError>
where
    F: for<'c> FnMut(&'c mut PgConnection) -> BoxFuture<'c, Result<T, LedgerError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;

        let mut tx = pool
            .begin()
            .await
            .map_err(crate::db::RepositoryError::Database)?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(crate::db::RepositoryError::Database)?;
        sqlx::query(&format!("SET LOCAL statement_timeout = '{STATEMENT_TIMEOUT}'"))
            .execute(&mut *tx)
            .await
            .map_err(crate::db::RepositoryError::Database)?;

        match op(&mut *tx).await {
            Ok(value) => match tx.commit().await {
                Ok(()) => return Ok(value),
                Err(err) => {
                    let err: LedgerError = crate::db::RepositoryError::Database(err).into();
                    if err.is_serialization_conflict() && attempt < MAX_ATTEMPTS {
                        backoff(attempt).await;
                        continue;
                    }
                    return Err(err);
                }
            },
            Err(err) => {
                // Rollback failure is secondary to the original error.
                let _ = tx.rollback().await;
                if err.is_serialization_conflict() && attempt < MAX_ATTEMPTS {
                    warn!(attempt, "serialization conflict, retrying transaction");
                    backoff(attempt).await;
                    continue;
                }
                return Err(err);
            }
        }
    }
}

/// Sleep for `BASE_BACKOFF * 2^(attempt-1)` with ±50% jitter.
async fn backoff(attempt: u32) {
    let exp = BASE_BACKOFF.saturating_mul(1 << (attempt - 1).min(8));
    let jitter = rand::rng().random_range(0.5..1.5);
    let delay = exp.mul_f64(jitter);
    tokio::time::sleep(delay).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule_is_bounded() {
        // 4 attempts means at most 3 sleeps: 25, 50, 100ms nominal, jitter
        // bounded by 1.5x. Worst case well under a second.
        let worst: Duration = (1..MAX_ATTEMPTS)
            .map(|a| BASE_BACKOFF.saturating_mul(1 << (a - 1)).mul_f64(1.5))
            .sum();
        assert!(worst < Duration::from_secs(1));
    }
}
