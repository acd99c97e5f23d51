//! Source extraction into staging
//!
//! Both modes stream rows from the source `efz_customers` table and upsert
//! them into `stg_customers` in batches. Full mode truncates staging first
//! and re-extracts everything; incremental mode pulls only rows newer than
//! the watermark and records the new high-watermark afterwards.
//!
//! The watermark read order is: the log table, then `max(created_at)`
//! already staged (the first incremental after a full load never wrote the
//! log), then nothing at all, in which case the whole source is extracted.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::{PgPool, QueryBuilder};
use tracing::{debug, info};

use crate::models::{ExtractStats, ExtractionMode, StagedCustomer};
use crate::schema::STAGING_TABLE;
use crate::watermark::WatermarkStore;

/// Columns pulled from the source table, in staging column order
const SOURCE_COLUMNS: &str = "customer_code, customer_name, customer_type, email, phone_number, \
     address_line, city, state, country, date_of_birth, gender, bvn, registration_number, \
     tax_id, branch_code, account_officer, status, is_pep, created_at, updated_at";

/// Hard cap on rows per staging insert (20 columns per row).
/// Limited by PostgreSQL parameter count limits.
const MAX_STAGING_INSERT_ROWS: usize = 2000;

/// Pulls source rows into the staging store
pub struct Extractor {
    source: PgPool,
    staging: PgPool,
    watermarks: WatermarkStore,
    batch_size: usize,
}

impl Extractor {
    pub fn new(source: PgPool, staging: PgPool, batch_size: usize) -> Self {
        let watermarks = WatermarkStore::new(staging.clone());
        Self {
            source,
            staging,
            watermarks,
            batch_size: batch_size.min(MAX_STAGING_INSERT_ROWS),
        }
    }

    /// Run one extraction in the given mode
    pub async fn run(&self, mode: ExtractionMode) -> Result<ExtractStats> {
        match mode {
            ExtractionMode::Full => self.full_load().await,
            ExtractionMode::Incremental => self.incremental_load().await,
        }
    }

    /// Truncate staging and re-extract the whole source table
    pub async fn full_load(&self) -> Result<ExtractStats> {
        info!("Truncating staging before full extraction");
        sqlx::query("TRUNCATE TABLE stg_customers")
            .execute(&self.staging)
            .await
            .context("Failed to truncate staging table")?;

        let (extracted, watermark) = self.copy_rows(None).await?;

        info!(rows = extracted, "Full extraction complete");
        Ok(ExtractStats {
            mode: ExtractionMode::Full,
            extracted,
            watermark,
        })
    }

    /// Extract rows newer than the watermark and advance it
    pub async fn incremental_load(&self) -> Result<ExtractStats> {
        let watermark = resolve_watermark(
            self.watermarks.last(STAGING_TABLE).await?,
            self.staged_high_watermark().await?,
        );

        match watermark {
            Some(watermark) => {
                info!(watermark = %watermark, "Incremental extraction from watermark")
            },
            None => info!("No previous ingestion found, extracting the full source table"),
        }

        let (extracted, high_watermark) = self.copy_rows(watermark).await?;

        if let Some(high_watermark) = high_watermark {
            self.watermarks.record(STAGING_TABLE, high_watermark).await?;
        }

        info!(rows = extracted, "Incremental extraction complete");
        Ok(ExtractStats {
            mode: ExtractionMode::Incremental,
            extracted,
            watermark: high_watermark,
        })
    }

    /// Stream source rows (optionally after a watermark) into staging
    ///
    /// Returns the staged row count and the highest `created_at` seen,
    /// starting from the watermark itself so an empty batch never moves
    /// the ledger backwards.
    async fn copy_rows(
        &self,
        after: Option<DateTime<Utc>>,
    ) -> Result<(usize, Option<DateTime<Utc>>)> {
        let full_sql = format!("SELECT {SOURCE_COLUMNS} FROM efz_customers ORDER BY created_at");
        let filtered_sql = format!(
            "SELECT {SOURCE_COLUMNS} FROM efz_customers WHERE created_at > $1 ORDER BY created_at"
        );

        let mut stream = match after {
            Some(watermark) => sqlx::query_as::<_, StagedCustomer>(&filtered_sql)
                .bind(watermark)
                .fetch(&self.source),
            None => sqlx::query_as::<_, StagedCustomer>(&full_sql).fetch(&self.source),
        };

        let mut batch: Vec<StagedCustomer> = Vec::with_capacity(self.batch_size);
        let mut extracted = 0usize;
        let mut high_watermark = after;

        while let Some(row) = stream
            .try_next()
            .await
            .context("Failed to read row from source table")?
        {
            match high_watermark {
                Some(current) if current >= row.created_at => {},
                _ => high_watermark = Some(row.created_at),
            }

            batch.push(row);
            if batch.len() >= self.batch_size {
                extracted += self.stage_batch(&batch).await?;
                batch.clear();
            }
        }

        if !batch.is_empty() {
            extracted += self.stage_batch(&batch).await?;
        }

        Ok((extracted, high_watermark))
    }

    /// Upsert one batch into staging, keyed on customer_code
    async fn stage_batch(&self, rows: &[StagedCustomer]) -> Result<usize> {
        let mut query_builder = QueryBuilder::new(
            "INSERT INTO stg_customers (customer_code, customer_name, customer_type, email, \
             phone_number, address_line, city, state, country, date_of_birth, gender, bvn, \
             registration_number, tax_id, branch_code, account_officer, status, is_pep, \
             created_at, updated_at) ",
        );

        query_builder.push_values(rows.iter(), |mut b, row| {
            b.push_bind(row.customer_code)
                .push_bind(&row.customer_name)
                .push_bind(&row.customer_type)
                .push_bind(&row.email)
                .push_bind(&row.phone_number)
                .push_bind(&row.address_line)
                .push_bind(&row.city)
                .push_bind(&row.state)
                .push_bind(&row.country)
                .push_bind(&row.date_of_birth)
                .push_bind(&row.gender)
                .push_bind(&row.bvn)
                .push_bind(&row.registration_number)
                .push_bind(&row.tax_id)
                .push_bind(&row.branch_code)
                .push_bind(&row.account_officer)
                .push_bind(&row.status)
                .push_bind(&row.is_pep)
                .push_bind(row.created_at)
                .push_bind(row.updated_at);
        });

        query_builder.push(
            " ON CONFLICT (customer_code) DO UPDATE SET \
             customer_name = EXCLUDED.customer_name, \
             customer_type = EXCLUDED.customer_type, \
             email = EXCLUDED.email, \
             phone_number = EXCLUDED.phone_number, \
             address_line = EXCLUDED.address_line, \
             city = EXCLUDED.city, \
             state = EXCLUDED.state, \
             country = EXCLUDED.country, \
             date_of_birth = EXCLUDED.date_of_birth, \
             gender = EXCLUDED.gender, \
             bvn = EXCLUDED.bvn, \
             registration_number = EXCLUDED.registration_number, \
             tax_id = EXCLUDED.tax_id, \
             branch_code = EXCLUDED.branch_code, \
             account_officer = EXCLUDED.account_officer, \
             status = EXCLUDED.status, \
             is_pep = EXCLUDED.is_pep, \
             created_at = EXCLUDED.created_at, \
             updated_at = EXCLUDED.updated_at",
        );

        query_builder
            .build()
            .execute(&self.staging)
            .await
            .context("Failed to stage batch")?;

        debug!(rows = rows.len(), "Staged batch");
        Ok(rows.len())
    }

    /// Newest `created_at` already staged, when staging has rows
    async fn staged_high_watermark(&self) -> Result<Option<DateTime<Utc>>> {
        sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT max(created_at) FROM stg_customers",
        )
        .fetch_one(&self.staging)
        .await
        .context("Failed to read staged high-watermark")
    }
}

/// Incremental watermark resolution: a recorded ledger value wins over the
/// staged high-watermark; with neither, the whole source is extracted
fn resolve_watermark(
    recorded: Option<DateTime<Utc>>,
    staged_max: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    recorded.or(staged_max)
}
