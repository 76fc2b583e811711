//! Spending-by-geography fetcher.
//!
//! Issues one logical "spend by state for (agency, fiscal year)" request and
//! owns the domain retry loop that sits on top of the transport layer:
//! - HTTP 429 waits for the server's `Retry-After` hint (or `base * attempt`) plus jitter
//! - any other non-success status waits `base * attempt` plus jitter
//! - connect/timeout/truncated-body faults wait the same way
//!
//! Every outcome is bounded by `max_attempts`. Nothing is persisted here.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::clean::clean_rows;
use super::provider::{FetchError, GeoRow, GeoSpendSource, RawGeoRow};
use super::sleep::{jitter, Sleeper};
use super::transport::{HttpReply, Transport};
use crate::config::RetryConfig;
use crate::fiscal::{fiscal_year_range, FiscalYearRange};

const GEOGRAPHY_PATH: &str = "/api/v2/search/spending_by_geography/";
const BODY_SNIPPET_CHARS: usize = 200;

#[derive(Debug, Serialize)]
struct GeographyRequest<'a> {
    filters: GeographyFilters<'a>,
    scope: &'static str,
    geo_layer: &'static str,
}

#[derive(Debug, Serialize)]
struct GeographyFilters<'a> {
    agencies: [AgencyFilter<'a>; 1],
    time_period: [FiscalYearRangeFilter; 1],
}

#[derive(Debug, Serialize)]
struct AgencyFilter<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    tier: &'static str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct FiscalYearRangeFilter {
    start_date: chrono::NaiveDate,
    end_date: chrono::NaiveDate,
}

#[derive(Debug, Deserialize)]
struct GeographyResponse {
    #[serde(default)]
    results: Vec<RawGeoRow>,
}

/// Build the request body scoping the query to one agency and one fiscal year.
pub fn geography_request_body(agency_name: &str, range: &FiscalYearRange) -> serde_json::Value {
    let request = GeographyRequest {
        filters: GeographyFilters {
            agencies: [AgencyFilter {
                kind: "awarding",
                tier: "subtier",
                name: agency_name,
            }],
            time_period: [FiscalYearRangeFilter {
                start_date: range.start,
                end_date: range.end,
            }],
        },
        scope: "place_of_performance",
        geo_layer: "state",
    };
    serde_json::json!(request)
}

/// Why a single attempt did not produce rows.
enum AttemptFailure {
    RateLimited { hint: Option<Duration> },
    Status(String),
    Connection(String),
}

/// Fetches cleaned state-level spend for one partition.
pub struct GeoSpendFetcher {
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    endpoint: String,
    retry: RetryConfig,
}

impl GeoSpendFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
        api_base_url: &str,
        retry: RetryConfig,
    ) -> Self {
        Self {
            transport,
            sleeper,
            endpoint: format!("{}{GEOGRAPHY_PATH}", api_base_url.trim_end_matches('/')),
            retry,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch, retrying per the domain policy, and clean the result rows.
    pub fn fetch(&self, agency_name: &str, fiscal_year: i32) -> Result<Vec<GeoRow>, FetchError> {
        let range =
            fiscal_year_range(fiscal_year).ok_or(FetchError::InvalidFiscalYear(fiscal_year))?;
        let body = geography_request_body(agency_name, &range);
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::from("no attempt completed");

        for attempt in 1..=max_attempts {
            let failure = match self.transport.post_json(&self.endpoint, &body) {
                Ok(reply) if reply.is_success() => {
                    return self.parse_rows(agency_name, fiscal_year, &reply);
                }
                Ok(reply) if reply.status == 429 => AttemptFailure::RateLimited {
                    hint: reply.retry_after,
                },
                Ok(reply) => AttemptFailure::Status(format!(
                    "HTTP {}: {}",
                    reply.status,
                    snippet(&reply.body)
                )),
                Err(e) if e.is_connection_fault() => AttemptFailure::Connection(e.to_string()),
                Err(source) => {
                    return Err(FetchError::Transport {
                        agency: agency_name.to_string(),
                        fiscal_year,
                        source,
                    });
                }
            };

            let delay = match failure {
                AttemptFailure::RateLimited { hint } => {
                    last_error = "HTTP 429: rate limited".to_string();
                    hint.unwrap_or_else(|| self.retry.backoff(attempt))
                        + jitter(self.retry.rate_limit_jitter_secs)
                }
                AttemptFailure::Status(msg) => {
                    last_error = msg;
                    self.retry.backoff(attempt) + jitter(self.retry.status_jitter_secs)
                }
                AttemptFailure::Connection(msg) => {
                    last_error = msg;
                    self.retry.backoff(attempt) + jitter(self.retry.connection_jitter_secs)
                }
            };

            if attempt == max_attempts {
                break;
            }
            warn!(
                agency = agency_name,
                fiscal_year,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "fetch attempt failed, backing off"
            );
            self.sleeper.sleep(delay);
        }

        Err(FetchError::Exhausted {
            agency: agency_name.to_string(),
            fiscal_year,
            attempts: max_attempts,
            last_error,
        })
    }

    fn parse_rows(
        &self,
        agency_name: &str,
        fiscal_year: i32,
        reply: &HttpReply,
    ) -> Result<Vec<GeoRow>, FetchError> {
        let response: GeographyResponse =
            serde_json::from_str(&reply.body).map_err(|e| FetchError::ResponseFormat {
                agency: agency_name.to_string(),
                fiscal_year,
                reason: e.to_string(),
            })?;
        let rows = clean_rows(&response.results);
        debug!(
            agency = agency_name,
            fiscal_year,
            raw = response.results.len(),
            kept = rows.len(),
            "cleaned geography rows"
        );
        Ok(rows)
    }
}

impl GeoSpendSource for GeoSpendFetcher {
    fn fetch_geo_spend(
        &self,
        agency_name: &str,
        fiscal_year: i32,
    ) -> Result<Vec<GeoRow>, FetchError> {
        self.fetch(agency_name, fiscal_year)
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_CHARS).collect()
}
