//! Resume cursor over the agency × fiscal-year iteration space.
//!
//! Agencies before the named start agency are skipped entirely; from the start
//! agency onward every agency is processed, and fiscal years below the minimum
//! are skipped for each of them. The cursor is supplied at startup and never
//! persisted.
//!
//! Resumption is keyed by display name. If an agency is renamed upstream the
//! start agency is simply not found and nothing is selected; callers should
//! check [`ResumeCursor::start_agency_found`] and report it.

use std::ops::RangeInclusive;

use crate::config::ResumeConfig;
use crate::warehouse::{Agency, PartitionKey};

/// One selected (agency, fiscal year) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedPartition<'a> {
    pub agency: &'a Agency,
    pub fiscal_year: i32,
}

impl PlannedPartition<'_> {
    pub fn key(&self) -> PartitionKey {
        PartitionKey::new(self.agency.id, self.fiscal_year)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeCursor {
    start_agency: Option<String>,
    min_fiscal_year: Option<i32>,
}

impl ResumeCursor {
    /// A blank `start_agency` means "from the first agency".
    pub fn new(start_agency: &str, min_fiscal_year: Option<i32>) -> Self {
        let start_agency = Some(start_agency.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        Self {
            start_agency,
            min_fiscal_year,
        }
    }

    pub fn from_beginning() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ResumeConfig) -> Self {
        Self::new(&config.agency, config.fiscal_year)
    }

    pub fn start_agency(&self) -> Option<&str> {
        self.start_agency.as_deref()
    }

    pub fn is_from_beginning(&self) -> bool {
        self.start_agency.is_none() && self.min_fiscal_year.is_none()
    }

    /// Whether the named start agency exists in `agencies` (always true from the beginning).
    pub fn start_agency_found(&self, agencies: &[Agency]) -> bool {
        match &self.start_agency {
            None => true,
            Some(name) => agencies.iter().any(|a| &a.name == name),
        }
    }

    /// Select the partitions to process, in iteration order.
    pub fn plan<'a>(
        &self,
        agencies: &'a [Agency],
        fiscal_years: RangeInclusive<i32>,
    ) -> Vec<PlannedPartition<'a>> {
        let mut started = self.start_agency.is_none();
        let mut planned = Vec::new();

        for agency in agencies {
            if !started {
                if self.start_agency.as_deref() == Some(agency.name.as_str()) {
                    started = true;
                } else {
                    continue;
                }
            }
            for fiscal_year in fiscal_years.clone() {
                if self.min_fiscal_year.is_some_and(|min| fiscal_year < min) {
                    continue;
                }
                planned.push(PlannedPartition {
                    agency,
                    fiscal_year,
                });
            }
        }
        planned
    }
}
