//! PostgreSQL warm tier.
//!
//! Same table contract as the SQLite warm tier; connections come from a
//! `deadpool-postgres` pool.

mod backend;
pub(crate) mod schema;

pub use backend::{PostgresWarmConfig, PostgresWarmTier};

const BACKEND_NAME: &str = "postgres";
