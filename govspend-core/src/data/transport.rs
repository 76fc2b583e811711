//! Pooled HTTP transport with a status-driven retry layer.
//!
//! This is the lower of the two retry layers. It retries a single request on
//! whitelisted transient statuses and connect/timeout faults with exponential
//! backoff, and when its budget runs out on a status it hands back the last
//! response instead of failing, so the fetch loop above can apply its own
//! rate-limit and backoff policy.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, RETRY_AFTER};
use thiserror::Error;
use tracing::warn;

use super::sleep::{Sleeper, ThreadSleeper};
use crate::config::TransportConfig;

/// Longest `Retry-After` hint honored; larger hints are clamped to this.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// A completed HTTP exchange, reduced to what the fetch loop needs.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    /// `Retry-After` in seconds, when the server sent a numeric hint.
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport-level failures (no HTTP status was obtained).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("response body interrupted: {0}")]
    Body(String),

    #[error("http client setup failed: {0}")]
    Builder(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl TransportError {
    /// Connection-level faults the fetch loop retries: connect, timeout, truncated body.
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout(_) | Self::Body(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            Self::Builder(e.to_string())
        } else if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_body() || e.is_decode() {
            Self::Body(e.to_string())
        } else if e.is_request() && !e.is_redirect() {
            // Send-phase failures after connecting: reset, aborted, closed before
            // the response head arrived.
            Self::Connect(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

/// Minimal HTTP surface the loader needs. Implemented by [`ResilientHttpClient`]
/// and by scripted doubles in tests.
pub trait Transport: Send + Sync {
    fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpReply, TransportError>;

    fn get_json(&self, url: &str) -> Result<HttpReply, TransportError>;
}

/// Retry decisions for the transport layer, kept separate from I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub status_forcelist: Vec<u16>,
}

impl TransportRetryPolicy {
    pub fn from_config(config: &TransportConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_factor: config.backoff_factor,
            status_forcelist: config.status_forcelist.clone(),
        }
    }

    /// No transport retries at all.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            backoff_factor: 0.0,
            status_forcelist: Vec::new(),
        }
    }

    /// Whether a response with `status` should be retried after `retries_done` retries.
    pub fn retries_status(&self, status: u16, retries_done: u32) -> bool {
        retries_done < self.max_retries && self.status_forcelist.contains(&status)
    }

    /// Whether a transport error should be retried after `retries_done` retries.
    pub fn retries_error(&self, err: &TransportError, retries_done: u32) -> bool {
        retries_done < self.max_retries
            && matches!(err, TransportError::Connect(_) | TransportError::Timeout(_))
    }

    /// Delay before retry number `retry` (1-based): `factor * 2^(retry-1)`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        Duration::from_secs_f64(self.backoff_factor * f64::from(1u32 << exp))
    }

    /// Delay before retrying a response: a 429's own hint wins over the backoff curve.
    pub fn delay_for(&self, status: u16, retry_after: Option<Duration>, retry: u32) -> Duration {
        match retry_after {
            Some(hint) if status == 429 => hint,
            _ => self.backoff(retry),
        }
    }
}

/// Long-lived pooled client shared by every request of a run.
pub struct ResilientHttpClient {
    client: reqwest::blocking::Client,
    policy: TransportRetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl ResilientHttpClient {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        Self::with_sleeper(config, Arc::new(ThreadSleeper))
    }

    /// Build a client whose retry pauses go through `sleeper`.
    pub fn with_sleeper(
        config: &TransportConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            policy: TransportRetryPolicy::from_config(config),
            sleeper,
        })
    }

    pub fn policy(&self) -> &TransportRetryPolicy {
        &self.policy
    }

    /// Send a request, retrying per the policy. `build` is called once per try.
    fn send_with_retry(
        &self,
        url: &str,
        build: impl Fn() -> reqwest::blocking::RequestBuilder,
    ) -> Result<HttpReply, TransportError> {
        let mut retries = 0;
        loop {
            let err = match build().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let retry_after = parse_retry_after(resp.headers());
                    if self.policy.retries_status(status, retries) {
                        retries += 1;
                        let delay = self.policy.delay_for(status, retry_after, retries);
                        warn!(url, status, retry = retries, delay_ms = delay.as_millis() as u64, "transport retry on status");
                        self.sleeper.sleep(delay);
                        continue;
                    }
                    let body = resp.text()?;
                    return Ok(HttpReply {
                        status,
                        retry_after,
                        body,
                    });
                }
                Err(e) => TransportError::from(e),
            };

            if !self.policy.retries_error(&err, retries) {
                return Err(err);
            }
            retries += 1;
            let delay = self.policy.backoff(retries);
            warn!(url, error = %err, retry = retries, delay_ms = delay.as_millis() as u64, "transport retry on error");
            self.sleeper.sleep(delay);
        }
    }
}

impl Transport for ResilientHttpClient {
    fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpReply, TransportError> {
        self.send_with_retry(url, || self.client.post(url).json(body))
    }

    fn get_json(&self, url: &str) -> Result<HttpReply, TransportError> {
        self.send_with_retry(url, || self.client.get(url))
    }
}

/// Numeric `Retry-After` seconds, clamped to [`MAX_RETRY_AFTER`].
/// HTTP-date hints are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| *secs >= 0.0)
        .map(f64::abs)?;
    let hint = Duration::try_from_secs_f64(secs).unwrap_or(MAX_RETRY_AFTER);
    Some(hint.min(MAX_RETRY_AFTER))
}
