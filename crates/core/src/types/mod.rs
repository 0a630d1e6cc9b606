//! Core types for the StoreScribe ledger.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod status;

pub use email::{Email, EmailAddressError};
pub use id::*;
pub use money::{CurrencyCode, Price, UnknownCurrency};
pub use status::*;
