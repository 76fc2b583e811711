//! Partitioned, idempotent loads of the fact table.
//!
//! A partition is one (agency, fiscal year). Loading a partition deletes every
//! existing row for it before inserting the new generation, so at most one
//! generation is ever visible. Inserts are best-effort per row: a constraint
//! violation skips that row and is counted, anything else aborts the partition.

use rusqlite::{params, ErrorCode, Transaction};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Warehouse, WarehouseError};
use crate::data::GeoRow;

/// The unit of idempotent mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub agency_id: i64,
    pub fiscal_year: i32,
}

impl PartitionKey {
    pub fn new(agency_id: i64, fiscal_year: i32) -> Self {
        Self {
            agency_id,
            fiscal_year,
        }
    }
}

/// Per-row outcome of a partition insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub inserted: usize,
    pub skipped: usize,
}

impl Warehouse {
    /// Delete every row of a partition and commit. Returns the number removed.
    pub fn delete_partition(&mut self, key: PartitionKey) -> Result<usize, WarehouseError> {
        let tx = self.connection_mut().transaction()?;
        let deleted = delete_rows(&tx, key)?;
        tx.commit()?;
        Ok(deleted)
    }

    /// Insert rows tagged with the partition key and commit.
    ///
    /// Rows rejected by a constraint (duplicate state, missing agency) are
    /// skipped and counted; other failures roll the whole insert back.
    pub fn insert_partition(
        &mut self,
        key: PartitionKey,
        rows: &[GeoRow],
    ) -> Result<LoadReport, WarehouseError> {
        let tx = self.connection_mut().transaction()?;
        let report = insert_rows(&tx, key, rows)?;
        tx.commit()?;
        Ok(report)
    }

    /// Delete then insert in a single transaction.
    ///
    /// The delete runs even when `rows` is empty, so a partition whose upstream
    /// data vanished ends up empty rather than stale.
    pub fn replace_partition(
        &mut self,
        key: PartitionKey,
        rows: &[GeoRow],
    ) -> Result<LoadReport, WarehouseError> {
        let tx = self.connection_mut().transaction()?;
        delete_rows(&tx, key)?;
        let report = insert_rows(&tx, key, rows)?;
        tx.commit()?;
        Ok(report)
    }

    /// Current rows of a partition, ordered by state code.
    pub fn partition_rows(&self, key: PartitionKey) -> Result<Vec<GeoRow>, WarehouseError> {
        let mut stmt = self.connection().prepare(
            "SELECT state_code, amount
             FROM fact_spend_agency_state_year
             WHERE agency_id = ?1 AND year = ?2
             ORDER BY state_code",
        )?;
        let rows = stmt.query_map(params![key.agency_id, key.fiscal_year], |row| {
            Ok(GeoRow {
                state_code: row.get(0)?,
                amount: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Total rows in the fact table.
    pub fn fact_row_count(&self) -> Result<usize, WarehouseError> {
        let count: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM fact_spend_agency_state_year",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn delete_rows(tx: &Transaction<'_>, key: PartitionKey) -> Result<usize, rusqlite::Error> {
    tx.execute(
        "DELETE FROM fact_spend_agency_state_year WHERE agency_id = ?1 AND year = ?2",
        params![key.agency_id, key.fiscal_year],
    )
}

fn insert_rows(
    tx: &Transaction<'_>,
    key: PartitionKey,
    rows: &[GeoRow],
) -> Result<LoadReport, rusqlite::Error> {
    let mut stmt = tx.prepare(
        "INSERT INTO fact_spend_agency_state_year (year, agency_id, state_code, amount)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    let mut report = LoadReport::default();
    for row in rows {
        match stmt.execute(params![key.fiscal_year, key.agency_id, row.state_code, row.amount]) {
            Ok(_) => report.inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, msg))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                warn!(
                    agency_id = key.agency_id,
                    fiscal_year = key.fiscal_year,
                    state_code = %row.state_code,
                    reason = msg.as_deref().unwrap_or("constraint violation"),
                    "skipping row"
                );
                report.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AgencyRecord;

    fn warehouse_with(names: &[&str]) -> Warehouse {
        let mut wh = Warehouse::open_in_memory().unwrap();
        wh.ensure_schema().unwrap();
        let records: Vec<AgencyRecord> = names
            .iter()
            .enumerate()
            .map(|(i, n)| AgencyRecord {
                toptier_code: format!("{:03}", i + 1),
                agency_name: n.to_string(),
            })
            .collect();
        wh.upsert_agencies(&records).unwrap();
        wh
    }

    #[test]
    fn replace_is_idempotent() {
        let mut wh = warehouse_with(&["Alpha", "Beta"]);
        let key = PartitionKey::new(2, 2020);
        let rows = vec![GeoRow::new("CA", 100.0), GeoRow::new("TX", 25.5)];

        let first = wh.replace_partition(key, &rows).unwrap();
        let second = wh.replace_partition(key, &rows).unwrap();

        assert_eq!(first, LoadReport { inserted: 2, skipped: 0 });
        assert_eq!(second, first);
        assert_eq!(
            wh.partition_rows(key).unwrap(),
            vec![GeoRow::new("CA", 100.0), GeoRow::new("TX", 25.5)]
        );
        assert_eq!(wh.fact_row_count().unwrap(), 2);
    }

    #[test]
    fn replace_with_no_rows_empties_partition() {
        let mut wh = warehouse_with(&["Alpha"]);
        let key = PartitionKey::new(1, 2019);
        wh.replace_partition(key, &[GeoRow::new("NY", 1.0)]).unwrap();
        let report = wh.replace_partition(key, &[]).unwrap();
        assert_eq!(report, LoadReport::default());
        assert!(wh.partition_rows(key).unwrap().is_empty());
    }

    #[test]
    fn replace_leaves_other_partitions_alone() {
        let mut wh = warehouse_with(&["Alpha", "Beta"]);
        wh.replace_partition(PartitionKey::new(1, 2020), &[GeoRow::new("CA", 1.0)])
            .unwrap();
        wh.replace_partition(PartitionKey::new(1, 2021), &[GeoRow::new("CA", 2.0)])
            .unwrap();
        wh.replace_partition(PartitionKey::new(2, 2020), &[GeoRow::new("CA", 3.0)])
            .unwrap();

        wh.replace_partition(PartitionKey::new(1, 2020), &[GeoRow::new("WA", 9.0)])
            .unwrap();

        assert_eq!(wh.fact_row_count().unwrap(), 3);
        assert_eq!(
            wh.partition_rows(PartitionKey::new(1, 2021)).unwrap(),
            vec![GeoRow::new("CA", 2.0)]
        );
    }

    #[test]
    fn delete_then_insert_matches_replace() {
        let mut wh = warehouse_with(&["Alpha"]);
        let key = PartitionKey::new(1, 2022);
        wh.insert_partition(key, &[GeoRow::new("OR", 4.0)]).unwrap();

        assert_eq!(wh.delete_partition(key).unwrap(), 1);
        assert_eq!(wh.delete_partition(key).unwrap(), 0);
        let report = wh.insert_partition(key, &[GeoRow::new("OR", 5.0)]).unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(wh.partition_rows(key).unwrap(), vec![GeoRow::new("OR", 5.0)]);
    }

    #[test]
    fn duplicate_state_row_is_skipped() {
        let mut wh = warehouse_with(&["Alpha"]);
        let key = PartitionKey::new(1, 2020);
        let report = wh
            .insert_partition(
                key,
                &[GeoRow::new("CA", 1.0), GeoRow::new("CA", 2.0), GeoRow::new("NV", 3.0)],
            )
            .unwrap();
        assert_eq!(report, LoadReport { inserted: 2, skipped: 1 });
        assert_eq!(
            wh.partition_rows(key).unwrap(),
            vec![GeoRow::new("CA", 1.0), GeoRow::new("NV", 3.0)]
        );
    }

    #[test]
    fn unknown_agency_rows_are_skipped_not_fatal() {
        let mut wh = warehouse_with(&["Alpha"]);
        let key = PartitionKey::new(42, 2020);
        let report = wh
            .replace_partition(key, &[GeoRow::new("CA", 1.0), GeoRow::new("TX", 2.0)])
            .unwrap();
        assert_eq!(report, LoadReport { inserted: 0, skipped: 2 });
        assert_eq!(wh.fact_row_count().unwrap(), 0);
    }
}
