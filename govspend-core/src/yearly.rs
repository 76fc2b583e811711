//! Agency-wide yearly load: one budgetary request per agency, replaced per agency.
//!
//! Agencies are walked in dimension order. A failed fetch leaves that agency's
//! existing rows in place and the run moves on; only warehouse errors stop it.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::IntervalConfig;
use crate::data::{Sleeper, YearlySpendError, YearlySpendSource};
use crate::orchestrator::StdoutProgress;
use crate::warehouse::{Agency, LoadReport, Warehouse, WarehouseError};

/// Totals for a yearly run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YearlyRunSummary {
    pub agencies: usize,
    pub loaded: usize,
    pub failed: usize,
    pub rows_inserted: usize,
    pub rows_skipped: usize,
}

/// Progress callbacks for a yearly run.
pub trait YearlyProgress {
    fn on_agency_loaded(&self, agency: &Agency, report: &LoadReport);

    fn on_agency_failed(&self, agency: &Agency, err: &YearlySpendError);

    fn on_yearly_complete(&self, summary: &YearlyRunSummary);
}

impl YearlyProgress for StdoutProgress {
    fn on_agency_loaded(&self, agency: &Agency, report: &LoadReport) {
        println!("Agency {}: inserted {} rows", agency.toptier_code, report.inserted);
    }

    fn on_agency_failed(&self, agency: &Agency, err: &YearlySpendError) {
        eprintln!("[ERROR] {} ({}): {err}", agency.name, agency.toptier_code);
    }

    fn on_yearly_complete(&self, summary: &YearlyRunSummary) {
        println!(
            "Finished loading all agencies. {} rows inserted ({} agencies loaded, {} failed)",
            summary.rows_inserted, summary.loaded, summary.failed
        );
    }
}

/// Loads `fact_spend_agency_year` for every agency in the dimension.
pub struct YearlyLoader {
    pacing: IntervalConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl YearlyLoader {
    pub fn new(pacing: IntervalConfig, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { pacing, sleeper }
    }

    pub fn run(
        &self,
        source: &dyn YearlySpendSource,
        warehouse: &mut Warehouse,
        progress: &dyn YearlyProgress,
    ) -> Result<YearlyRunSummary, WarehouseError> {
        let agencies = warehouse.agencies()?;
        info!(agencies = agencies.len(), "starting yearly load");

        let mut summary = YearlyRunSummary {
            agencies: agencies.len(),
            ..YearlyRunSummary::default()
        };

        for agency in &agencies {
            self.sleeper.sleep(self.pacing.sample());

            match source.fetch_yearly_spend(&agency.toptier_code) {
                Ok(rows) => {
                    let report = warehouse.replace_agency_years(agency.id, &rows)?;
                    summary.loaded += 1;
                    summary.rows_inserted += report.inserted;
                    summary.rows_skipped += report.skipped;
                    progress.on_agency_loaded(agency, &report);
                }
                Err(err) => {
                    summary.failed += 1;
                    error!(agency = %agency.name, toptier_code = %agency.toptier_code, error = %err, "yearly fetch failed");
                    progress.on_agency_failed(agency, &err);
                }
            }
        }

        info!(
            inserted = summary.rows_inserted,
            loaded = summary.loaded,
            failed = summary.failed,
            "yearly load complete"
        );
        progress.on_yearly_complete(&summary);
        Ok(summary)
    }
}
