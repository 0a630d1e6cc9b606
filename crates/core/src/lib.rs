//! StoreScribe Core - Shared domain types.
//!
//! This crate provides the common types used across the StoreScribe credit
//! ledger components:
//! - `ledger` - The credit/usage ledger library
//! - `cli` - Command-line tools for migrations and catalog seeding
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access, no SMTP.
//! The optional `postgres` feature adds sqlx `Type`/`Encode`/`Decode`
//! implementations so the newtypes can be bound directly in queries.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, email addresses, money, and status enums

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
