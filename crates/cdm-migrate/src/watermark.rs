//! Incremental extraction watermark ledger
//!
//! `ingestion_incremental_log` records the newest `created_at` staged per
//! table, upserted after every incremental run. Reading it back is how the
//! next run knows where to resume.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

/// Access to the watermark log on the staging store
pub struct WatermarkStore {
    db: PgPool,
}

impl WatermarkStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Recorded high-watermark for a table, if one was ever written
    pub async fn last(&self, table: &str) -> Result<Option<DateTime<Utc>>> {
        let recorded = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT last_ingested_at FROM ingestion_incremental_log WHERE table_name = $1",
        )
        .bind(table)
        .fetch_optional(&self.db)
        .await
        .context("Failed to read watermark log")?;

        if let Some(watermark) = recorded {
            debug!(table = %table, watermark = %watermark, "Watermark found in log");
        }

        Ok(recorded)
    }

    /// Record a new high-watermark, keyed on table name
    pub async fn record(&self, table: &str, watermark: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ingestion_incremental_log (table_name, last_ingested_at, last_updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (table_name)
            DO UPDATE SET last_ingested_at = EXCLUDED.last_ingested_at, last_updated_at = now()
            "#,
        )
        .bind(table)
        .bind(watermark)
        .execute(&self.db)
        .await
        .context("Failed to record watermark")?;

        debug!(table = %table, watermark = %watermark, "Watermark recorded");
        Ok(())
    }
}
