//! Append-only CSV log of partitions that exhausted their retry budget.
//!
//! Columns: `agency_name,fy,error`. The header is written once when the file is
//! created. Records are never rewritten or deduplicated: rerunning a partition
//! that fails again appends another line.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Error messages are cut to this many characters.
pub const MAX_ERROR_CHARS: usize = 300;

const HEADER: [&str; 3] = ["agency_name", "fy", "error"];

#[derive(Debug, Error)]
pub enum FailureLogError {
    #[error("failure log I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failure log CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// One abandoned partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub agency_name: String,
    pub fiscal_year: i32,
    pub error: String,
}

/// Handle to the failure log file.
#[derive(Debug, Clone)]
pub struct FailureLog {
    path: PathBuf,
}

impl FailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file with its header if absent; otherwise leave it untouched.
    pub fn init(&self) -> Result<(), FailureLogError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        let file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(()),
            Err(source) => return Err(self.io_error(source)),
        };
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(HEADER)?;
        writer.flush().map_err(|source| self.io_error(source))?;
        Ok(())
    }

    /// Append one record, truncating the error message.
    pub fn append(
        &self,
        agency_name: &str,
        fiscal_year: i32,
        error: &str,
    ) -> Result<(), FailureLogError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_error(source))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        let fiscal_year = fiscal_year.to_string();
        let truncated: String = error.chars().take(MAX_ERROR_CHARS).collect();
        writer.write_record([agency_name, fiscal_year.as_str(), truncated.as_str()])?;
        writer.flush().map_err(|source| self.io_error(source))?;
        Ok(())
    }

    /// Read every record back. Not used by the load itself; handy for reports and tests.
    pub fn read_all(&self) -> Result<Vec<FailureRecord>, FailureLogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let fiscal_year = row.get(1).and_then(|fy| fy.parse().ok());
            if let (Some(agency_name), Some(fiscal_year), Some(error)) =
                (row.get(0), fiscal_year, row.get(2))
            {
                records.push(FailureRecord {
                    agency_name: agency_name.to_string(),
                    fiscal_year,
                    error: error.to_string(),
                });
            }
        }
        Ok(records)
    }

    fn io_error(&self, source: io::Error) -> FailureLogError {
        FailureLogError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
