//! CDM Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the customer data migration
//! workspace.
//!
//! # Overview
//!
//! This crate provides functionality used across all CDM workspace members:
//!
//! - **Error Handling**: The [`MigrationError`] type and [`Result`] alias
//! - **Logging**: Console/file logging setup backed by `tracing`
//!
//! # Example
//!
//! ```no_run
//! use cdm_common::logging::{LogConfig, init_logging};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     tracing::info!("migration tool started");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{MigrationError, Result};
