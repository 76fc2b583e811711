//! Row cleaning: jurisdiction whitelist, null filtering, numeric coercion.
//!
//! Cleaning is a filter. Rows that fail any rule are dropped without error;
//! they are routine noise in the upstream feed.

use super::provider::{GeoRow, RawGeoRow};

/// Valid jurisdiction codes: 50 states, DC, territories and military postal codes.
pub const VALID_STATE_CODES: [&str; 59] = [
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN",
    "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
    "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
    "VT", "VA", "WA", "WV", "WI", "WY",
    // territories
    "PR", "GU", "VI", "AS", "MP",
    // military
    "AA", "AE", "AP",
];

/// Whether `code` (already normalized) is a known jurisdiction.
pub fn is_valid_state_code(code: &str) -> bool {
    VALID_STATE_CODES.contains(&code)
}

/// Clean one raw row, or `None` if it must be dropped.
///
/// Rules, in order: code present and non-blank; code trimmed and upper-cased;
/// code whitelisted; amount present; amount coercible to a finite `f64`.
pub fn clean_row(raw: &RawGeoRow) -> Option<GeoRow> {
    let code = raw.shape_code.as_deref()?.trim();
    if code.is_empty() {
        return None;
    }
    let code = code.to_ascii_uppercase();
    if !is_valid_state_code(&code) {
        return None;
    }
    let amount = coerce_amount(raw.aggregated_amount.as_ref()?)?;
    Some(GeoRow {
        state_code: code,
        amount,
    })
}

/// Clean a batch, preserving the order of surviving rows.
pub fn clean_rows(raw: &[RawGeoRow]) -> Vec<GeoRow> {
    raw.iter().filter_map(clean_row).collect()
}

pub(crate) fn coerce_amount(value: &serde_json::Value) -> Option<f64> {
    let amount = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    amount.is_finite().then_some(amount)
}
