//! Fiscal-year date windows.
//!
//! A federal fiscal year runs October 1 through September 30 and is named by
//! the calendar year in which it ends: FY2020 = 2019-10-01 ..= 2020-09-30.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Inclusive calendar-date window for one fiscal year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalYearRange {
    pub fiscal_year: i32,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FiscalYearRange {
    /// Whether a calendar date falls inside this fiscal year.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Map a fiscal year to its start/end boundary.
///
/// Returns `None` only for years chrono cannot represent.
pub fn fiscal_year_range(fiscal_year: i32) -> Option<FiscalYearRange> {
    let start = NaiveDate::from_ymd_opt(fiscal_year.checked_sub(1)?, 10, 1)?;
    let end = NaiveDate::from_ymd_opt(fiscal_year, 9, 30)?;
    Some(FiscalYearRange {
        fiscal_year,
        start,
        end,
    })
}
