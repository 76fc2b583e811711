//! Toptier agency reference list.
//!
//! One-shot fetch used to seed the warehouse agency dimension. The endpoint
//! has returned both `{"results": [...]}` and a bare list over time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::transport::{Transport, TransportError};

const TOPTIER_AGENCIES_PATH: &str = "/api/v2/references/toptier_agencies/";

/// Failures fetching the reference list.
#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("agency reference request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("agency reference returned HTTP {0}")]
    Status(u16),

    #[error("agency reference response unreadable: {0}")]
    Format(#[from] serde_json::Error),
}

/// An agency as listed by the reference endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencyRecord {
    pub toptier_code: String,
    pub agency_name: String,
}

#[derive(Debug, Deserialize)]
struct LooseAgency {
    #[serde(default)]
    toptier_code: Option<String>,
    #[serde(default)]
    agency_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AgencyListing {
    Wrapped { results: Vec<LooseAgency> },
    Bare(Vec<LooseAgency>),
}

/// Parse the reference response, dropping entries without a code or a name.
pub fn parse_toptier_agencies(body: &str) -> Result<Vec<AgencyRecord>, serde_json::Error> {
    let listing: AgencyListing = serde_json::from_str(body)?;
    let entries = match listing {
        AgencyListing::Wrapped { results } => results,
        AgencyListing::Bare(list) => list,
    };
    Ok(entries
        .into_iter()
        .filter_map(|a| {
            let code = a.toptier_code.filter(|c| !c.trim().is_empty())?;
            let name = a.agency_name.filter(|n| !n.trim().is_empty())?;
            Some(AgencyRecord {
                toptier_code: code.trim().to_string(),
                agency_name: name.trim().to_string(),
            })
        })
        .collect())
}

/// Fetch the toptier agency list. Relies on the transport layer for retries.
pub fn fetch_toptier_agencies(
    transport: &dyn Transport,
    api_base_url: &str,
) -> Result<Vec<AgencyRecord>, ReferenceError> {
    let url = format!(
        "{}{TOPTIER_AGENCIES_PATH}",
        api_base_url.trim_end_matches('/')
    );
    let reply = transport.get_json(&url)?;
    if !reply.is_success() {
        return Err(ReferenceError::Status(reply.status));
    }
    Ok(parse_toptier_agencies(&reply.body)?)
}
