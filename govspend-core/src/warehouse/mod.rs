//! SQLite spending warehouse.
//!
//! Tables:
//! - `dim_agency(agency_id, toptier_code, agency_name)` — agency dimension,
//!   read-only to the load pipeline
//! - `fact_spend_agency_state_year(year, agency_id, state_code, amount)` —
//!   one row per (fiscal year, agency, state), partitioned by (agency, year)
//! - `fact_spend_agency_year(year, agency_id, amount)` — agency-wide yearly
//!   obligations, replaced one agency at a time
//!
//! One long-lived connection serves the whole run. Commits bracket each
//! partition; nothing spans two partitions.

pub mod partition;
pub mod yearly;

use std::path::Path;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::AgencyRecord;

pub use partition::{LoadReport, PartitionKey};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS dim_agency (
    agency_id    INTEGER PRIMARY KEY,
    toptier_code TEXT NOT NULL UNIQUE,
    agency_name  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS fact_spend_agency_state_year (
    year       INTEGER NOT NULL,
    agency_id  INTEGER NOT NULL REFERENCES dim_agency(agency_id),
    state_code TEXT    NOT NULL,
    amount     REAL    NOT NULL,
    PRIMARY KEY (year, agency_id, state_code)
);

CREATE INDEX IF NOT EXISTS idx_fact_agency_year
    ON fact_spend_agency_state_year (agency_id, year);

CREATE TABLE IF NOT EXISTS fact_spend_agency_year (
    year      INTEGER NOT NULL,
    agency_id INTEGER NOT NULL REFERENCES dim_agency(agency_id),
    amount    REAL    NOT NULL,
    PRIMARY KEY (year, agency_id)
);
";

/// Errors from the warehouse layer.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("failed to open warehouse {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("warehouse error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// A row of the agency dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agency {
    pub id: i64,
    pub toptier_code: String,
    pub name: String,
}

/// Outcome of seeding the agency dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgencySyncReport {
    pub attempted: usize,
    pub inserted: usize,
}

/// Handle to the warehouse database.
#[derive(Debug)]
pub struct Warehouse {
    conn: Connection,
}

impl Warehouse {
    /// Open (or create) a warehouse file. Foreign keys are enforced.
    pub fn open(path: &Path) -> Result<Self, WarehouseError> {
        let conn = Connection::open(path).map_err(|source| WarehouseError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Private in-memory warehouse, mostly for tests.
    pub fn open_in_memory() -> Result<Self, WarehouseError> {
        let conn = Connection::open_in_memory().map_err(|source| WarehouseError::Open {
            path: ":memory:".into(),
            source,
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, WarehouseError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(Self { conn })
    }

    /// Create tables and indexes if they do not exist.
    pub fn ensure_schema(&self) -> Result<(), WarehouseError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// All agencies, ordered by name so resumed runs walk the same sequence.
    pub fn agencies(&self) -> Result<Vec<Agency>, WarehouseError> {
        let mut stmt = self.conn.prepare(
            "SELECT agency_id, toptier_code, agency_name
             FROM dim_agency
             ORDER BY agency_name, agency_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Agency {
                id: row.get(0)?,
                toptier_code: row.get(1)?,
                name: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Insert agencies whose toptier code is not yet present. Existing rows are untouched.
    pub fn upsert_agencies(
        &mut self,
        agencies: &[AgencyRecord],
    ) -> Result<AgencySyncReport, WarehouseError> {
        let tx = self.conn.transaction()?;
        let mut report = AgencySyncReport::default();
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO dim_agency (toptier_code, agency_name) VALUES (?1, ?2)",
            )?;
            for agency in agencies {
                report.attempted += 1;
                report.inserted += stmt.execute(params![agency.toptier_code, agency.agency_name])?;
            }
        }
        tx.commit()?;
        Ok(report)
    }

    pub(crate) fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}
