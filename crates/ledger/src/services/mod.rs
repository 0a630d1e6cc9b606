//! Ledger services: catalog, pricing, purchase lifecycle, reporting, email.

pub mod catalog;
pub mod email;
pub mod pricing;
pub mod purchase;
pub mod reporting;

pub use catalog::{CatalogService, CustomPackageRequest};
pub use email::{EmailError, EmailService};
pub use pricing::{
    AppliedDiscount, AppliedPromotion, BillingOperations, FinalPrice, PricingService,
    StandardBillingOperations,
};
pub use purchase::{PurchaseOutcome, PurchaseService};
pub use reporting::ReportingService;

use crate::db::RepositoryError;
use crate::error::LedgerError;

/// Lift a repository error into the service taxonomy, promoting constraint
/// violations to [`LedgerError::Conflict`] so callers see the field name.
pub(crate) fn lift(err: RepositoryError) -> LedgerError {
    match err {
        RepositoryError::Conflict(field) => LedgerError::Conflict { field },
        other => LedgerError::Repository(other),
    }
}
