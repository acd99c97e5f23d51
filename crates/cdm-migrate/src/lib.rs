//! CDM Migrate Library
//!
//! Batch migration of customer data from the legacy core-banking table into
//! the destination platform's `customer` and `customer_profile` tables.
//!
//! The pipeline runs in stages:
//!
//! 1. **Extract**: pull rows from the source `efz_customers` table into the
//!    staging table, either in full or incrementally by watermark
//! 2. **Assign identifiers**: guarantee a stable UUID pair per customer code
//!    in the `customer_uuids` ledger
//! 3. **Transform**: rename, default, and convert staged fields per the
//!    mapping document, consolidating KYC attributes into a profile document
//! 4. **Load**: upsert the transformed records into the destination tables
//!
//! # Example
//!
//! ```no_run
//! use cdm_migrate::config::MigrationConfig;
//! use cdm_migrate::pipeline::{LoadTarget, MigrationPipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = MigrationConfig::from_env()?;
//!     let pipeline = MigrationPipeline::new(config)?;
//!     let summary = pipeline.run_transform_load(LoadTarget::All).await?;
//!     tracing::info!("{}", summary.summary());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod extract;
pub mod identifiers;
pub mod load;
pub mod mapping;
pub mod models;
pub mod pipeline;
pub mod schema;
pub mod transform;
pub mod value;
pub mod watermark;
