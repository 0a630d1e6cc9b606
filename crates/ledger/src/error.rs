//! Ledger error taxonomy.
//!
//! Every fallible operation returns [`LedgerError`]. Callers branch on
//! variants (and on [`EmailError`] codes for delivery failures) rather than
//! matching message text.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::email::EmailError;

/// Errors surfaced by the ledger services.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No shop is registered under the given domain.
    #[error("shop not found")]
    ShopNotFound,

    /// The referenced credit package does not exist.
    #[error("package not found")]
    PackageNotFound,

    /// The referenced credit purchase does not exist.
    #[error("purchase not found")]
    PurchaseNotFound,

    /// No staff account is registered under a syntactically valid email.
    #[error("associated user not found for email: {email}")]
    AssociatedUserNotFound {
        /// The address that failed to resolve.
        email: String,
    },

    /// Input failed validation before any transaction began.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The shop's balance cannot cover the requested deduction.
    #[error("insufficient credits: available {available}, required {required}")]
    InsufficientCredits {
        /// Balance at the time of the check.
        available: Decimal,
        /// Amount the caller asked to deduct.
        required: Decimal,
    },

    /// A unique constraint was violated; the offending field is named.
    #[error("conflict on {field}")]
    Conflict {
        /// Field (or constraint) that collided.
        field: String,
    },

    /// Email delivery failed; see [`EmailError`] for the code discriminator.
    #[error("email error: {0}")]
    Email(#[from] EmailError),

    /// Repository-layer failure (database error or corrupted stored data).
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl LedgerError {
    /// Whether this error is a Postgres serialization conflict (or deadlock)
    /// that the transaction wrapper may retry.
    #[must_use]
    pub fn is_serialization_conflict(&self) -> bool {
        let Self::Repository(RepositoryError::Database(sqlx::Error::Database(db_err))) = self
        else {
            return false;
        };
        matches!(
            db_err.code().as_deref(),
            Some("40001") | Some("40P01")
        )
    }
}

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_field_on_conflict() {
        let err = LedgerError::Conflict {
            field: "shopify_purchase_id".to_owned(),
        };
        assert_eq!(err.to_string(), "conflict on shopify_purchase_id");
    }

    #[test]
    fn test_insufficient_credits_reports_both_sides() {
        let err = LedgerError::InsufficientCredits {
            available: Decimal::new(5, 0),
            required: Decimal::new(10, 0),
        };
        assert_eq!(
            err.to_string(),
            "insufficient credits: available 5, required 10"
        );
    }

    #[test]
    fn test_non_database_errors_are_not_retryable() {
        assert!(!LedgerError::ShopNotFound.is_serialization_conflict());
        assert!(
            !LedgerError::Validation("bad".to_owned()).is_serialization_conflict()
        );
    }
}
