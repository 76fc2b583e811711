//! Load orchestrator — walks the agency × fiscal-year space one partition at a time.
//!
//! Per partition:
//! 1. random pacing pause
//! 2. delete the partition's rows and commit, so a crash leaves it empty, never stale
//! 3. fetch; on success insert and commit, on terminal failure log it, cool down, move on
//!
//! A failed partition never stops the run. Only warehouse or failure-log I/O
//! errors do, since no further progress could be recorded.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::LoaderConfig;
use crate::data::{FetchError, GeoSpendSource, Sleeper};
use crate::failure_log::{FailureLog, FailureLogError};
use crate::resume::{PlannedPartition, ResumeCursor};
use crate::warehouse::{LoadReport, PartitionKey, Warehouse, WarehouseError};

/// Run-level failures. Per-partition fetch failures are not among them.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    FailureLog(#[from] FailureLogError),
}

/// What happened to one partition.
#[derive(Debug)]
pub enum PartitionOutcome {
    Loaded(LoadReport),
    Failed(FetchError),
}

/// Totals for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub partitions: usize,
    pub loaded: usize,
    pub failed: usize,
    pub rows_inserted: usize,
    pub rows_skipped: usize,
    pub failure_log: PathBuf,
}

/// Progress callbacks for a load run.
pub trait LoadProgress {
    /// Called before a partition's request is issued.
    fn on_start(&self, agency: &str, fiscal_year: i32, index: usize, total: usize);

    /// Called after a partition's rows are committed.
    fn on_loaded(&self, agency: &str, fiscal_year: i32, report: &LoadReport);

    /// Called after a partition is abandoned.
    fn on_failed(&self, agency: &str, fiscal_year: i32, err: &FetchError);

    /// Called once at the end of the run.
    fn on_run_complete(&self, summary: &RunSummary);
}

/// Progress reporter that prints to stdout/stderr.
pub struct StdoutProgress;

impl LoadProgress for StdoutProgress {
    fn on_start(&self, agency: &str, fiscal_year: i32, index: usize, total: usize) {
        println!("[{}/{}] {agency} FY{fiscal_year}...", index + 1, total);
    }

    fn on_loaded(&self, agency: &str, fiscal_year: i32, report: &LoadReport) {
        if report.skipped > 0 {
            println!(
                "{agency} FY{fiscal_year}: inserted {} state rows ({} skipped)",
                report.inserted, report.skipped
            );
        } else {
            println!("{agency} FY{fiscal_year}: inserted {} state rows", report.inserted);
        }
    }

    fn on_failed(&self, agency: &str, fiscal_year: i32, err: &FetchError) {
        eprintln!("[ERROR] {agency} FY{fiscal_year}: {err}");
    }

    fn on_run_complete(&self, summary: &RunSummary) {
        println!("{}", "=".repeat(60));
        println!(
            "LOAD COMPLETE. Total rows inserted: {} ({} partitions loaded, {} failed)",
            summary.rows_inserted, summary.loaded, summary.failed
        );
        println!("Failures (if any) logged to: {}", summary.failure_log.display());
        println!("{}", "=".repeat(60));
    }
}

/// Drives a full load with a frozen configuration.
pub struct Orchestrator {
    config: LoaderConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl Orchestrator {
    pub fn new(config: LoaderConfig, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { config, sleeper }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Process every partition the resume cursor selects.
    pub fn run(
        &self,
        source: &dyn GeoSpendSource,
        warehouse: &mut Warehouse,
        failures: &FailureLog,
        progress: &dyn LoadProgress,
    ) -> Result<RunSummary, OrchestratorError> {
        failures.init()?;

        let agencies = warehouse.agencies()?;
        let cursor = ResumeCursor::from_config(&self.config.resume);
        if !cursor.start_agency_found(&agencies) {
            warn!(
                start_agency = cursor.start_agency().unwrap_or_default(),
                "resume agency not found; no partitions selected"
            );
        }
        let plan = cursor.plan(&agencies, self.config.fiscal_years());
        info!(agencies = agencies.len(), partitions = plan.len(), "starting load");

        let mut summary = RunSummary {
            partitions: plan.len(),
            failure_log: failures.path().to_path_buf(),
            ..RunSummary::default()
        };

        for (index, partition) in plan.iter().enumerate() {
            let agency = partition.agency.name.as_str();
            let fiscal_year = partition.fiscal_year;
            progress.on_start(agency, fiscal_year, index, plan.len());

            self.sleeper.sleep(self.config.pacing.sample());

            match self.process_partition(source, warehouse, partition)? {
                PartitionOutcome::Loaded(report) => {
                    summary.loaded += 1;
                    summary.rows_inserted += report.inserted;
                    summary.rows_skipped += report.skipped;
                    info!(
                        agency,
                        fiscal_year,
                        inserted = report.inserted,
                        skipped = report.skipped,
                        "partition loaded"
                    );
                    progress.on_loaded(agency, fiscal_year, &report);
                }
                PartitionOutcome::Failed(err) => {
                    summary.failed += 1;
                    error!(agency, fiscal_year, error = %err, "partition abandoned");
                    progress.on_failed(agency, fiscal_year, &err);
                    failures.append(agency, fiscal_year, &err.to_string())?;
                    self.sleeper.sleep(self.config.cooldown.sample());
                }
            }
        }

        info!(
            inserted = summary.rows_inserted,
            loaded = summary.loaded,
            failed = summary.failed,
            "load complete"
        );
        progress.on_run_complete(&summary);
        Ok(summary)
    }

    /// Delete, fetch and (on success) insert one partition.
    ///
    /// The delete is committed before the fetch, so a failed or interrupted
    /// partition is left empty.
    pub fn process_partition(
        &self,
        source: &dyn GeoSpendSource,
        warehouse: &mut Warehouse,
        partition: &PlannedPartition<'_>,
    ) -> Result<PartitionOutcome, WarehouseError> {
        let key: PartitionKey = partition.key();
        warehouse.delete_partition(key)?;

        match source.fetch_geo_spend(&partition.agency.name, partition.fiscal_year) {
            Ok(rows) => Ok(PartitionOutcome::Loaded(
                warehouse.insert_partition(key, &rows)?,
            )),
            Err(err) => Ok(PartitionOutcome::Failed(err)),
        }
    }
}
