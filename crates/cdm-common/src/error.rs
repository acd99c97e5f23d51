//! Error types for the customer data migration

use thiserror::Error;

/// Result type alias for migration operations
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Main error type for the migration
///
/// The first three variants mirror the aborting pipeline stages. Row-level
/// transform failures never surface here: the transformer logs, counts and
/// skips them.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Identifier assignment error: {0}")]
    IdentifierAssignment(String),

    #[error("Load error: {0}")]
    Load(String),

    #[error("Mapping document error: {0}")]
    Mapping(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
