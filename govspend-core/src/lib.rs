//! GovSpend Core — resilient fetch, clean and load of agency spending by state.
//!
//! This crate contains the whole loading pipeline:
//! - Fiscal-year date windows
//! - Two-layer retry: status-driven transport retries and a rate-limit aware fetch loop
//! - Row cleaning against the jurisdiction-code whitelist
//! - Idempotent (agency, fiscal year) partition loads into the SQLite warehouse
//! - Append-only failure log for exhausted partitions
//! - Resume cursor and the sequential orchestrator that ties it together
//! - Agency-wide yearly totals from the budgetary resources endpoint

pub mod config;
pub mod data;
pub mod failure_log;
pub mod fiscal;
pub mod orchestrator;
pub mod resume;
pub mod warehouse;
pub mod yearly;

pub use config::{ConfigError, LoaderConfig};
pub use failure_log::{FailureLog, FailureLogError};
pub use fiscal::{fiscal_year_range, FiscalYearRange};
pub use orchestrator::{
    LoadProgress, Orchestrator, OrchestratorError, PartitionOutcome, RunSummary, StdoutProgress,
};
pub use resume::ResumeCursor;
pub use warehouse::{Agency, LoadReport, PartitionKey, Warehouse, WarehouseError};
pub use yearly::{YearlyLoader, YearlyProgress, YearlyRunSummary};
