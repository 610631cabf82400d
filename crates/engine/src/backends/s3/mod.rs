//! Object-storage cold tier.
//!
//! Each record is one JSON object at `{prefix}/records/{id}.json`. The tier
//! works against any [`object_store::ObjectStore`]; with the `s3` feature,
//! [`S3ColdTier::new`] builds an Amazon S3 (or S3-compatible) store from
//! [`S3ColdConfig`].

mod backend;
mod config;

pub use backend::S3ColdTier;
pub use config::S3ColdConfig;

const BACKEND_NAME: &str = "s3";
