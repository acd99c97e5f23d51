//! cdm-migrate - Customer data migration tool

use std::path::PathBuf;

use anyhow::Result;
use cdm_common::logging::{init_logging, LogConfig, LogLevel};
use cdm_migrate::config::MigrationConfig;
use cdm_migrate::pipeline::{LoadTarget, MigrationPipeline};
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cdm-migrate")]
#[command(author, version, about = "Customer data migration tool")]
struct Cli {
    /// Migration operation to run
    #[command(subcommand)]
    operation: Operation,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Replacement mapping document
    #[arg(long, env = "CDM_MAPPING_PATH", global = true)]
    mapping: Option<PathBuf>,
}

#[derive(Parser, Debug)]
enum Operation {
    /// Truncate staging and re-extract the whole source table
    FullLoad,

    /// Extract only source rows newer than the watermark
    IncrementalLoad,

    /// Transform staged rows and upsert them into the destination
    TransformLoad {
        /// Destination tables to write
        #[arg(short, long, value_enum, default_value = "all")]
        target: TargetArg,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum TargetArg {
    /// Both destination tables
    All,
    /// Only the customer table
    Customers,
    /// Only the customer_profile table
    Profiles,
}

impl From<TargetArg> for LoadTarget {
    fn from(target: TargetArg) -> Self {
        match target {
            TargetArg::All => LoadTarget::All,
            TargetArg::Customers => LoadTarget::Customers,
            TargetArg::Profiles => LoadTarget::Profiles,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env must load before the CLI parses its env fallbacks and before
    // logging reads its settings
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Environment configures logging; the verbose flag overrides the level
    let mut log_config = LogConfig::from_env()?;
    if cli.verbose {
        log_config = log_config.with_level(LogLevel::Debug);
    }
    init_logging(&log_config)?;

    let mut config = MigrationConfig::from_env()?;
    if let Some(mapping) = cli.mapping {
        config.mapping_path = Some(mapping);
    }

    let pipeline = MigrationPipeline::new(config)?;

    match cli.operation {
        Operation::FullLoad => {
            let stats = pipeline.run_full_load().await?;
            info!("{}", stats.summary());
        },
        Operation::IncrementalLoad => {
            let stats = pipeline.run_incremental_load().await?;
            info!("{}", stats.summary());
        },
        Operation::TransformLoad { target } => {
            let summary = pipeline.run_transform_load(target.into()).await?;
            info!("{}", summary.summary());
        },
    }

    Ok(())
}
