//! StoreScribe credit & usage ledger.
//!
//! Tracks purchased credit packages, subscription balances, and per-service
//! (AI / Crawl) consumption for StoreScribe shops, and drives the billing
//! state machine around them. This crate is consumed in-process by HTTP and
//! webhook handlers; it exposes no network surface of its own.
//!
//! # Architecture
//!
//! - [`db`] - Postgres repositories (sqlx) and the serializable-transaction
//!   retry wrapper. Every multi-step mutation runs under Serializable
//!   isolation; contention is handled by bounded retry, not by callers.
//! - [`models`] - Domain structs mirroring the persisted state.
//! - [`services`] - Business operations: package catalog, pricing,
//!   purchase lifecycle, reporting, and email dispatch.
//! - [`config`] - Environment-driven configuration.
//! - [`error`] - The structured [`error::LedgerError`] taxonomy; callers
//!   pattern-match variants instead of comparing message strings.
//!
//! # Purchase flow
//!
//! ```text
//! purchase_credits_with_promotions
//!   resolve shop, package, staff user
//!   calculate final price (promotions + discounts)
//!   [serializable tx] usage + purchase + billing events + payment + outbox
//!   [post-commit]     confirmation email (best-effort)
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use config::{EmailConfig, LedgerConfig};
pub use error::LedgerError;
