//! Agency-wide yearly obligations from the budgetary resources endpoint.
//!
//! One GET per agency returns every fiscal year the API knows about. Rows are
//! kept when the year falls in the configured window and the total obligated
//! amount is present and numeric.

use std::ops::RangeInclusive;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::clean::coerce_amount;
use super::transport::{Transport, TransportError};

const AGENCY_PATH: &str = "/api/v2/agency/";
const BUDGETARY_RESOURCES_SUFFIX: &str = "/budgetary_resources/";

/// One cleaned row: an agency's total obligations for a fiscal year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearlySpend {
    pub fiscal_year: i32,
    pub amount: f64,
}

impl YearlySpend {
    pub fn new(fiscal_year: i32, amount: f64) -> Self {
        Self {
            fiscal_year,
            amount,
        }
    }
}

/// A yearly entry as the API returns it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawYearlySpend {
    #[serde(default)]
    pub fiscal_year: Option<serde_json::Value>,
    #[serde(default)]
    pub agency_total_obligated: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct BudgetaryResources {
    #[serde(default)]
    agency_data_by_year: Vec<RawYearlySpend>,
}

/// Failures fetching one agency's yearly totals.
#[derive(Debug, Error)]
pub enum YearlySpendError {
    #[error("agency {toptier_code}: request failed: {source}")]
    Transport {
        toptier_code: String,
        #[source]
        source: TransportError,
    },

    #[error("agency {toptier_code}: HTTP {status}")]
    Status { toptier_code: String, status: u16 },

    #[error("agency {toptier_code}: unreadable response: {source}")]
    Format {
        toptier_code: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Anything that can produce cleaned yearly totals for one agency.
pub trait YearlySpendSource {
    fn fetch_yearly_spend(&self, toptier_code: &str) -> Result<Vec<YearlySpend>, YearlySpendError>;
}

/// Keep rows whose year is in `years` and whose amount is present and numeric.
pub fn clean_yearly_rows(raw: &[RawYearlySpend], years: &RangeInclusive<i32>) -> Vec<YearlySpend> {
    raw.iter()
        .filter_map(|row| {
            let year = row
                .fiscal_year
                .as_ref()?
                .as_i64()
                .and_then(|y| i32::try_from(y).ok())?;
            if !years.contains(&year) {
                return None;
            }
            let amount = coerce_amount(row.agency_total_obligated.as_ref()?)?;
            Some(YearlySpend::new(year, amount))
        })
        .collect()
}

/// Parse a budgetary resources body and clean it.
pub fn parse_yearly_spend(
    body: &str,
    years: &RangeInclusive<i32>,
) -> Result<Vec<YearlySpend>, serde_json::Error> {
    let resources: BudgetaryResources = serde_json::from_str(body)?;
    Ok(clean_yearly_rows(&resources.agency_data_by_year, years))
}

/// Fetches yearly totals over the transport. Retries are left to the transport layer.
pub struct BudgetaryFetcher {
    transport: Arc<dyn Transport>,
    base_url: String,
    years: RangeInclusive<i32>,
}

impl BudgetaryFetcher {
    pub fn new(transport: Arc<dyn Transport>, api_base_url: &str, years: RangeInclusive<i32>) -> Self {
        Self {
            transport,
            base_url: api_base_url.trim_end_matches('/').to_string(),
            years,
        }
    }

    pub fn url_for(&self, toptier_code: &str) -> String {
        format!(
            "{}{AGENCY_PATH}{}{BUDGETARY_RESOURCES_SUFFIX}",
            self.base_url,
            toptier_code.trim()
        )
    }
}

impl YearlySpendSource for BudgetaryFetcher {
    fn fetch_yearly_spend(&self, toptier_code: &str) -> Result<Vec<YearlySpend>, YearlySpendError> {
        let reply = self
            .transport
            .get_json(&self.url_for(toptier_code))
            .map_err(|source| YearlySpendError::Transport {
                toptier_code: toptier_code.to_string(),
                source,
            })?;
        if !reply.is_success() {
            return Err(YearlySpendError::Status {
                toptier_code: toptier_code.to_string(),
                status: reply.status,
            });
        }
        let rows = parse_yearly_spend(&reply.body, &self.years).map_err(|source| {
            YearlySpendError::Format {
                toptier_code: toptier_code.to_string(),
                source,
            }
        })?;
        debug!(toptier_code, rows = rows.len(), "yearly spend fetched");
        Ok(rows)
    }
}
