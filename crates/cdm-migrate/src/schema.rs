//! Staging-side schema setup
//!
//! Creates the staging table, the identifier ledger, and the watermark log
//! when missing. Destination tables belong to the target platform and are
//! never created or truncated here.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::debug;

/// Staging table name; also the key under which the watermark log tracks it
pub const STAGING_TABLE: &str = "stg_customers";

/// Ensure all staging-store tables exist
pub async fn ensure_staging_schema(pool: &PgPool) -> Result<()> {
    // customer_code is the business key; the primary key keeps staging
    // duplicate-free across repeated extractions
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stg_customers (
            customer_code       BIGINT PRIMARY KEY,
            customer_name       TEXT NOT NULL,
            customer_type       TEXT NOT NULL,
            email               TEXT,
            phone_number        TEXT,
            address_line        TEXT,
            city                TEXT,
            state               TEXT,
            country             TEXT,
            date_of_birth       TEXT,
            gender              TEXT,
            bvn                 TEXT,
            registration_number TEXT,
            tax_id              TEXT,
            branch_code         TEXT,
            account_officer     TEXT,
            status              TEXT,
            is_pep              TEXT,
            created_at          TIMESTAMPTZ NOT NULL,
            updated_at          TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create stg_customers")?;

    // Identifier ledger: rows are inserted once and never updated
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS customer_uuids (
            customer_code       BIGINT PRIMARY KEY,
            "customerId"        UUID NOT NULL,
            "customerProfileId" UUID NOT NULL,
            assigned_at         TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create customer_uuids")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingestion_incremental_log (
            table_name       TEXT PRIMARY KEY,
            last_ingested_at TIMESTAMPTZ NOT NULL,
            last_updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create ingestion_incremental_log")?;

    debug!("Staging schema ensured");
    Ok(())
}
