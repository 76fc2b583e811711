//! Upstream data access: transport, fetch loop, row cleaning, reference data.

pub mod agencies;
pub mod budgetary;
pub mod clean;
pub mod provider;
pub mod sleep;
pub mod transport;
pub mod usaspending;

pub use agencies::{fetch_toptier_agencies, parse_toptier_agencies, AgencyRecord, ReferenceError};
pub use budgetary::{
    clean_yearly_rows, parse_yearly_spend, BudgetaryFetcher, RawYearlySpend, YearlySpend,
    YearlySpendError, YearlySpendSource,
};
pub use clean::{clean_row, clean_rows, VALID_STATE_CODES};
pub use provider::{FetchError, GeoRow, GeoSpendSource, RawGeoRow};
pub use sleep::{jitter, RecordingSleeper, Sleeper, ThreadSleeper};
pub use transport::{HttpReply, ResilientHttpClient, Transport, TransportError, TransportRetryPolicy};
pub use usaspending::GeoSpendFetcher;
