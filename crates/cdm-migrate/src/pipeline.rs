//! Migration pipeline
//!
//! Orchestrates the migration operations end to end. Extraction runs
//! connect to the source and staging stores; transform+load runs connect
//! to staging and the destination, assign identifiers, transform staged
//! rows and upsert the results.
//!
//! Failures carry their stage in the error: extraction, identifier
//! assignment and loading abort the run, while per-row transform failures
//! are logged, counted and skipped.

use std::collections::HashMap;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{info, warn};

use cdm_common::MigrationError;

use crate::config::MigrationConfig;
use crate::db;
use crate::extract::Extractor;
use crate::identifiers::IdentifierAssigner;
use crate::load::Loader;
use crate::mapping::MappingDocument;
use crate::models::{CustomerIdentifiers, ExtractStats, ExtractionMode, LoadSummary, StagedCustomer};
use crate::schema;
use crate::transform::Transformer;

/// Which destination tables a transform+load run writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadTarget {
    /// Both destination tables
    #[default]
    All,
    /// Only the `customer` table
    Customers,
    /// Only the `customer_profile` table
    Profiles,
}

impl LoadTarget {
    fn includes_customers(self) -> bool {
        matches!(self, LoadTarget::All | LoadTarget::Customers)
    }

    fn includes_profiles(self) -> bool {
        matches!(self, LoadTarget::All | LoadTarget::Profiles)
    }
}

/// End-to-end customer migration pipeline
pub struct MigrationPipeline {
    config: MigrationConfig,
    mapping: MappingDocument,
}

impl MigrationPipeline {
    /// Create a pipeline, loading the mapping override when configured
    pub fn new(config: MigrationConfig) -> Result<Self> {
        let mapping = match &config.mapping_path {
            Some(path) => {
                info!(path = %path.display(), "Loading mapping document override");
                MappingDocument::from_path(path)?
            },
            None => MappingDocument::builtin()?,
        };

        Ok(Self { config, mapping })
    }

    /// The mapping document this pipeline runs with
    pub fn mapping(&self) -> &MappingDocument {
        &self.mapping
    }

    /// Truncate staging and restage the whole source table
    pub async fn run_full_load(&self) -> Result<ExtractStats> {
        self.run_extraction(ExtractionMode::Full).await
    }

    /// Stage only source rows newer than the watermark
    pub async fn run_incremental_load(&self) -> Result<ExtractStats> {
        self.run_extraction(ExtractionMode::Incremental).await
    }

    async fn run_extraction(&self, mode: ExtractionMode) -> Result<ExtractStats> {
        info!(mode = %mode, "Starting customer extraction");

        info!("Phase 1: Connecting to source and staging stores");
        let source = db::create_pool(&self.config.source, &self.config.pool).await?;
        let staging = db::create_pool(&self.config.staging, &self.config.pool).await?;

        info!("Phase 2: Ensuring staging schema");
        schema::ensure_staging_schema(&staging).await?;

        info!("Phase 3: Extracting source rows into staging");
        let extractor = Extractor::new(source, staging, self.config.batch_size);
        let stats = extractor
            .run(mode)
            .await
            .map_err(|e| MigrationError::Extraction(format!("{e:#}")))?;

        info!(
            mode = %stats.mode,
            extracted = stats.extracted,
            "Customer extraction completed successfully"
        );
        Ok(stats)
    }

    /// Transform staged rows and upsert them into the destination
    pub async fn run_transform_load(&self, target: LoadTarget) -> Result<LoadSummary> {
        info!("Starting customer transform+load");

        info!("Phase 1: Connecting to staging and destination stores");
        let staging = db::create_pool(&self.config.staging, &self.config.pool).await?;
        let destination = db::create_pool(&self.config.destination, &self.config.pool).await?;

        info!("Phase 2: Ensuring staging schema");
        schema::ensure_staging_schema(&staging).await?;

        info!("Phase 3: Assigning identifier pairs");
        let assigner = IdentifierAssigner::new(staging.clone());
        let new_identifiers = assigner
            .ensure_coverage()
            .await
            .map_err(|e| MigrationError::IdentifierAssignment(format!("{e:#}")))?;

        info!("Phase 4: Reading staged rows");
        let rows = fetch_staged(&staging).await?;
        let identifiers: HashMap<i64, CustomerIdentifiers> = assigner
            .fetch_mappings()
            .await
            .map_err(|e| MigrationError::IdentifierAssignment(format!("{e:#}")))?;

        info!("Phase 5: Transforming staged rows");
        let transformer = Transformer::new(self.mapping.clone());
        let outcome = transformer.transform_batch(&rows, &identifiers);
        if outcome.skipped > 0 {
            warn!(
                skipped = outcome.skipped,
                "Rows failed transformation and were skipped"
            );
        }

        info!("Phase 6: Loading destination tables");
        let loader = Loader::new(destination, self.config.batch_size);

        let customers_upserted = if target.includes_customers() {
            loader
                .upsert_customers(&outcome.customers, &self.mapping.customer_columns())
                .await
                .map_err(|e| MigrationError::Load(format!("{e:#}")))?
        } else {
            0
        };

        let profiles_upserted = if target.includes_profiles() {
            loader
                .upsert_profiles(&outcome.profiles, &self.mapping.profile_columns())
                .await
                .map_err(|e| MigrationError::Load(format!("{e:#}")))?
        } else {
            0
        };

        let summary = LoadSummary {
            staged: rows.len(),
            new_identifiers,
            transformed: outcome.customers.len(),
            skipped: outcome.skipped,
            customers_upserted,
            profiles_upserted,
        };

        info!(
            staged = summary.staged,
            new_identifiers = summary.new_identifiers,
            transformed = summary.transformed,
            skipped = summary.skipped,
            customers = summary.customers_upserted,
            profiles = summary.profiles_upserted,
            "Customer transform+load completed successfully"
        );
        Ok(summary)
    }
}

/// Read every staged row, ordered by customer code
async fn fetch_staged(staging: &PgPool) -> Result<Vec<StagedCustomer>> {
    sqlx::query_as::<_, StagedCustomer>(
        "SELECT customer_code, customer_name, customer_type, email, phone_number, \
         address_line, city, state, country, date_of_birth, gender, bvn, \
         registration_number, tax_id, branch_code, account_officer, status, is_pep, \
         created_at, updated_at \
         FROM stg_customers ORDER BY customer_code",
    )
    .fetch_all(staging)
    .await
    .context("Failed to read staged customers")
}
