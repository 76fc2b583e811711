//! Agency-wide yearly totals.
//!
//! Each agency's rows are replaced as a unit: delete everything for the
//! agency, insert the fresh years, commit once.

use rusqlite::{params, ErrorCode};
use tracing::warn;

use super::{LoadReport, Warehouse, WarehouseError};
use crate::data::YearlySpend;

impl Warehouse {
    /// Replace every yearly row of one agency in a single transaction.
    ///
    /// A row rejected by a constraint (repeated year, unknown agency) is skipped
    /// and counted.
    pub fn replace_agency_years(
        &mut self,
        agency_id: i64,
        rows: &[YearlySpend],
    ) -> Result<LoadReport, WarehouseError> {
        let tx = self.connection_mut().transaction()?;
        tx.execute(
            "DELETE FROM fact_spend_agency_year WHERE agency_id = ?1",
            params![agency_id],
        )?;
        let mut report = LoadReport::default();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO fact_spend_agency_year (year, agency_id, amount) VALUES (?1, ?2, ?3)",
            )?;
            for row in rows {
                match stmt.execute(params![row.fiscal_year, agency_id, row.amount]) {
                    Ok(_) => report.inserted += 1,
                    Err(rusqlite::Error::SqliteFailure(err, msg))
                        if err.code == ErrorCode::ConstraintViolation =>
                    {
                        warn!(
                            agency_id,
                            fiscal_year = row.fiscal_year,
                            reason = msg.as_deref().unwrap_or("constraint violation"),
                            "skipping yearly row"
                        );
                        report.skipped += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        tx.commit()?;
        Ok(report)
    }

    /// An agency's yearly rows, ordered by year.
    pub fn agency_years(&self, agency_id: i64) -> Result<Vec<YearlySpend>, WarehouseError> {
        let mut stmt = self.connection().prepare(
            "SELECT year, amount FROM fact_spend_agency_year
             WHERE agency_id = ?1
             ORDER BY year",
        )?;
        let rows = stmt.query_map(params![agency_id], |row| {
            Ok(YearlySpend::new(row.get(0)?, row.get(1)?))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AgencyRecord;

    fn warehouse() -> Warehouse {
        let mut wh = Warehouse::open_in_memory().unwrap();
        wh.ensure_schema().unwrap();
        wh.upsert_agencies(&[
            AgencyRecord {
                toptier_code: "247".into(),
                agency_name: "Alpha".into(),
            },
            AgencyRecord {
                toptier_code: "012".into(),
                agency_name: "Beta".into(),
            },
        ])
        .unwrap();
        wh
    }

    #[test]
    fn replace_swaps_the_agency_generation() {
        let mut wh = warehouse();
        wh.replace_agency_years(1, &[YearlySpend::new(2019, 1.0), YearlySpend::new(2020, 2.0)])
            .unwrap();
        let report = wh.replace_agency_years(1, &[YearlySpend::new(2021, 3.0)]).unwrap();

        assert_eq!(report, LoadReport { inserted: 1, skipped: 0 });
        assert_eq!(wh.agency_years(1).unwrap(), vec![YearlySpend::new(2021, 3.0)]);
    }

    #[test]
    fn replace_leaves_other_agencies_alone() {
        let mut wh = warehouse();
        wh.replace_agency_years(1, &[YearlySpend::new(2020, 1.0)]).unwrap();
        wh.replace_agency_years(2, &[YearlySpend::new(2020, 5.0)]).unwrap();
        wh.replace_agency_years(1, &[]).unwrap();

        assert!(wh.agency_years(1).unwrap().is_empty());
        assert_eq!(wh.agency_years(2).unwrap(), vec![YearlySpend::new(2020, 5.0)]);
    }

    #[test]
    fn repeated_year_and_unknown_agency_are_skipped() {
        let mut wh = warehouse();
        let report = wh
            .replace_agency_years(1, &[YearlySpend::new(2020, 1.0), YearlySpend::new(2020, 9.0)])
            .unwrap();
        assert_eq!(report, LoadReport { inserted: 1, skipped: 1 });
        assert_eq!(wh.agency_years(1).unwrap(), vec![YearlySpend::new(2020, 1.0)]);

        let orphan = wh.replace_agency_years(42, &[YearlySpend::new(2020, 1.0)]).unwrap();
        assert_eq!(orphan, LoadReport { inserted: 0, skipped: 1 });
    }
}
