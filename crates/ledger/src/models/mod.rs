//! Domain models for the ledger.
//!
//! These structs mirror the persisted state; repositories translate between
//! them and rows. They carry no behavior beyond small pure helpers (seeding,
//! invariants, snapshotting).

pub mod package;
pub mod promotion;
pub mod purchase;
pub mod shop;
pub mod usage;

pub use package::{AiFeature, CrawlFeature, CreditPackage, Feature, RateLimits};
pub use promotion::{Discount, Promotion};
pub use purchase::{
    BillingEvent, CreditPurchase, Notification, PackageSnapshot, Payment, TOPIC_CREDITS_PURCHASED,
};
pub use shop::{AssociatedUser, Shop, Subscription};
pub use usage::{ServiceUsage, ServiceUsageDetails, Usage};
