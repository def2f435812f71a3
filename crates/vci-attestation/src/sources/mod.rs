//! Built-in attestation sources.

mod database;
mod static_claims;

pub use database::{DatabaseSource, DatabaseSourceFactory};
pub use static_claims::{StaticSource, StaticSourceFactory};

/// Type name of the static-claims source.
pub const STATIC_TYPE: &str = "static";

/// Type name of the SQLite row-lookup source.
pub const DATABASE_TYPE: &str = "database";
