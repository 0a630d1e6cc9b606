//! CLI command implementations.

pub mod migrate;
pub mod outbox;
pub mod seed;
pub mod sweep;
