//! Connection pool construction for the three stores

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use cdm_common::{MigrationError, Result};

use crate::config::{PoolConfig, StoreConfig};

/// Create a connection pool for one store
pub async fn create_pool(store: &StoreConfig, sizing: &PoolConfig) -> Result<PgPool> {
    let options = store.connect_options()?;

    let pool = PgPoolOptions::new()
        .max_connections(sizing.max_connections)
        .min_connections(sizing.min_connections)
        .acquire_timeout(Duration::from_secs(sizing.connect_timeout_secs))
        .connect_with(options)
        .await
        .map_err(|e| {
            MigrationError::Database(format!(
                "failed to connect to '{}' on {}:{}: {e}",
                store.database, store.host, store.port
            ))
        })?;

    tracing::info!(
        database = %store.database,
        max_connections = sizing.max_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

/// Verify a pool can execute a query
pub async fn health_check(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(|e| MigrationError::Database(e.to_string()))
}
