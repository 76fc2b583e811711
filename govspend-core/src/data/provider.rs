//! Geographic spend source trait and structured error types.
//!
//! `GeoSpendSource` abstracts over where cleaned rows come from so the
//! orchestrator can run against the live API or a scripted source in tests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::transport::TransportError;

/// One cleaned result row: spend attributed to a jurisdiction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoRow {
    pub state_code: String,
    pub amount: f64,
}

impl GeoRow {
    pub fn new(state_code: impl Into<String>, amount: f64) -> Self {
        Self {
            state_code: state_code.into(),
            amount,
        }
    }
}

/// A result row as the upstream API returns it, before cleaning.
///
/// Both fields are optional and the amount is left as raw JSON: the feed
/// occasionally carries nulls, blanks and stringly-typed numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawGeoRow {
    #[serde(default)]
    pub shape_code: Option<String>,
    #[serde(default)]
    pub aggregated_amount: Option<serde_json::Value>,
}

impl RawGeoRow {
    pub fn new(shape_code: Option<&str>, aggregated_amount: Option<serde_json::Value>) -> Self {
        Self {
            shape_code: shape_code.map(str::to_string),
            aggregated_amount,
        }
    }
}

/// Terminal failure of one partition fetch. Every variant ends the partition.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed after {attempts} attempts: {agency} FY{fiscal_year}. Last error: {last_error}")]
    Exhausted {
        agency: String,
        fiscal_year: i32,
        attempts: u32,
        last_error: String,
    },

    #[error("{agency} FY{fiscal_year}: unreadable response: {reason}")]
    ResponseFormat {
        agency: String,
        fiscal_year: i32,
        reason: String,
    },

    #[error("{agency} FY{fiscal_year}: {source}")]
    Transport {
        agency: String,
        fiscal_year: i32,
        #[source]
        source: TransportError,
    },

    #[error("fiscal year {0} has no representable date range")]
    InvalidFiscalYear(i32),
}

/// Anything that can produce cleaned rows for one (agency, fiscal year).
pub trait GeoSpendSource {
    /// Fetch and clean place-of-performance spend by state.
    fn fetch_geo_spend(&self, agency_name: &str, fiscal_year: i32)
        -> Result<Vec<GeoRow>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_row_tolerates_missing_fields() {
        let row: RawGeoRow = serde_json::from_str(r#"{"display_name": "Texas"}"#).unwrap();
        assert_eq!(row, RawGeoRow::default());
    }

    #[test]
    fn exhausted_message_names_partition_and_cause() {
        let err = FetchError::Exhausted {
            agency: "Gamma".into(),
            fiscal_year: 2021,
            attempts: 6,
            last_error: "HTTP 500: boom".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Gamma FY2021"));
        assert!(msg.contains("6 attempts"));
        assert!(msg.contains("HTTP 500: boom"));
    }
}
