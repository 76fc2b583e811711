//! GovSpend CLI — load agency spending by state into the SQLite warehouse.
//!
//! Commands:
//! - `load` — walk agencies × fiscal years, fetch, clean and load each partition
//! - `load-yearly` — load agency-wide yearly obligations for every agency
//! - `sync-agencies` — seed the agency dimension from the reference endpoint
//! - `init-db` — create the warehouse schema

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use govspend_core::data::{
    fetch_toptier_agencies, BudgetaryFetcher, GeoSpendFetcher, ResilientHttpClient, ThreadSleeper,
};
use govspend_core::{
    FailureLog, LoaderConfig, Orchestrator, StdoutProgress, Warehouse, YearlyLoader,
};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "govspend",
    about = "GovSpend — resumable loader for federal spending by state"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// Path to a TOML config file. Defaults apply for anything it omits.
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite warehouse file (overrides the config).
    #[arg(long)]
    database: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and load every (agency, fiscal year) partition.
    Load {
        #[command(flatten)]
        common: CommonArgs,

        /// CSV file for abandoned partitions (overrides the config).
        #[arg(long)]
        failure_log: Option<PathBuf>,

        /// Resume at this agency name; earlier agencies are skipped.
        #[arg(long)]
        from_agency: Option<String>,

        /// Skip fiscal years below this once processing has started.
        #[arg(long)]
        from_year: Option<i32>,

        /// First fiscal year to load.
        #[arg(long)]
        first_year: Option<i32>,

        /// Last fiscal year to load.
        #[arg(long)]
        last_year: Option<i32>,

        /// Attempts per partition before it is abandoned.
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Load agency-wide yearly obligations for every agency.
    LoadYearly {
        #[command(flatten)]
        common: CommonArgs,

        /// First fiscal year to keep.
        #[arg(long)]
        first_year: Option<i32>,

        /// Last fiscal year to keep.
        #[arg(long)]
        last_year: Option<i32>,
    },
    /// Seed the agency dimension from the toptier agency reference list.
    SyncAgencies {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Create the warehouse tables if they do not exist.
    InitDb {
        #[command(flatten)]
        common: CommonArgs,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Load {
            common,
            failure_log,
            from_agency,
            from_year,
            first_year,
            last_year,
            max_attempts,
        } => {
            let mut config = load_config(&common)?;
            if let Some(path) = failure_log {
                config.failure_log_path = path;
            }
            if let Some(agency) = from_agency {
                config.resume.agency = agency;
            }
            if from_year.is_some() {
                config.resume.fiscal_year = from_year;
            }
            if let Some(year) = first_year {
                config.first_fiscal_year = year;
            }
            if let Some(year) = last_year {
                config.last_fiscal_year = year;
            }
            if let Some(attempts) = max_attempts {
                config.retry.max_attempts = attempts;
            }
            config.validate()?;
            run_load(config)
        }
        Commands::LoadYearly {
            common,
            first_year,
            last_year,
        } => {
            let mut config = load_config(&common)?;
            if let Some(year) = first_year {
                config.first_fiscal_year = year;
            }
            if let Some(year) = last_year {
                config.last_fiscal_year = year;
            }
            config.validate()?;
            run_load_yearly(config)
        }
        Commands::SyncAgencies { common } => run_sync_agencies(load_config(&common)?),
        Commands::InitDb { common } => run_init_db(&load_config(&common)?.database_path),
    }
}

fn load_config(common: &CommonArgs) -> Result<LoaderConfig> {
    let mut config = match &common.config {
        Some(path) => LoaderConfig::from_file(path)?,
        None => LoaderConfig::default(),
    };
    if let Some(database) = &common.database {
        config.database_path = database.clone();
    }
    Ok(config)
}

fn open_warehouse(path: &Path) -> Result<Warehouse> {
    let warehouse = Warehouse::open(path)
        .with_context(|| format!("cannot open warehouse {}", path.display()))?;
    warehouse.ensure_schema()?;
    Ok(warehouse)
}

fn run_load(config: LoaderConfig) -> Result<()> {
    let mut warehouse = open_warehouse(&config.database_path)?;
    let failures = FailureLog::new(&config.failure_log_path);

    let sleeper = Arc::new(ThreadSleeper);
    let client = ResilientHttpClient::with_sleeper(&config.transport, sleeper.clone())
        .context("cannot build HTTP client")?;
    let fetcher = GeoSpendFetcher::new(
        Arc::new(client),
        sleeper.clone(),
        &config.api_base_url,
        config.retry.clone(),
    );

    info!(
        database = %config.database_path.display(),
        first_year = config.first_fiscal_year,
        last_year = config.last_fiscal_year,
        resume_agency = %config.resume.agency,
        "load starting"
    );

    let orchestrator = Orchestrator::new(config, sleeper);
    let summary = orchestrator.run(&fetcher, &mut warehouse, &failures, &StdoutProgress)?;

    if summary.partitions == 0 {
        println!("No partitions selected. Check the resume agency name and the agency table.");
    }
    Ok(())
}

fn run_load_yearly(config: LoaderConfig) -> Result<()> {
    let mut warehouse = open_warehouse(&config.database_path)?;
    let sleeper = Arc::new(ThreadSleeper);
    let client = ResilientHttpClient::with_sleeper(&config.transport, sleeper.clone())
        .context("cannot build HTTP client")?;
    let fetcher = BudgetaryFetcher::new(Arc::new(client), &config.api_base_url, config.fiscal_years());

    info!(
        database = %config.database_path.display(),
        first_year = config.first_fiscal_year,
        last_year = config.last_fiscal_year,
        "yearly load starting"
    );

    let loader = YearlyLoader::new(config.pacing, sleeper);
    let summary = loader.run(&fetcher, &mut warehouse, &StdoutProgress)?;
    if summary.agencies == 0 {
        println!("No agencies in the warehouse. Run `govspend sync-agencies` first.");
    }
    Ok(())
}

fn run_sync_agencies(config: LoaderConfig) -> Result<()> {
    let mut warehouse = open_warehouse(&config.database_path)?;
    let client = ResilientHttpClient::new(&config.transport).context("cannot build HTTP client")?;

    let agencies = fetch_toptier_agencies(&client, &config.api_base_url)?;
    println!("Fetched {} agencies from API.", agencies.len());

    let report = warehouse.upsert_agencies(&agencies)?;
    println!(
        "Finished. Attempted inserts: {}, new agencies: {}",
        report.attempted, report.inserted
    );
    Ok(())
}

fn run_init_db(database: &Path) -> Result<()> {
    open_warehouse(database)?;
    println!("Warehouse schema ready: {}", database.display());
    Ok(())
}
