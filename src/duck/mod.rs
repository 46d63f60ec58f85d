// src/duck/mod.rs
use crate::process::delta::DeltaRow;
use crate::process::reshape::CumulativeRow;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use duckdb::{params, Connection, ToSql};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

pub const TOTAL_TABLE: &str = "deaths_total";
pub const PYTHON_DELTA_TABLE: &str = "deaths_change_python";
pub const SQL_DELTA_TABLE: &str = "deaths_change_sql";

/// Forward difference per country, 0 on each country's last date.
const SQL_DELTA_QUERY: &str = r#"
CREATE TABLE deaths_change_sql AS
    SELECT country, "date", cum_deaths,
           COALESCE(LEAD(cum_deaths, 1) OVER (PARTITION BY country ORDER BY "date") - cum_deaths, 0)
               AS day_deaths
    FROM deaths_total
    ORDER BY country, "date";
"#;

/// Rows written by one `replace_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteCounts {
    pub total: usize,
    pub python: usize,
    pub sql: usize,
}

/// Result of lining up both delta tables by (country, date).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaComparison {
    pub python_rows: usize,
    pub sql_rows: usize,
    pub mismatched: usize,
}

impl DeltaComparison {
    pub fn is_equivalent(&self) -> bool {
        self.python_rows == self.sql_rows && self.mismatched == 0
    }
}

/// Scoped handle over the DuckDB file. Dropping it releases the connection,
/// so every exit path closes the database; `close` surfaces close errors on
/// the normal path.
pub struct DeathsStore {
    conn: Connection,
}

impl DeathsStore {
    /// Open a DuckDB database on disk at `path`, creating the file if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn =
            Connection::open(path).with_context(|| format!("opening {}", path.display()))?;
        info!(path = %path.display(), "opened database");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Replace all three tables in one transaction. On error nothing is
    /// committed and the previous run's tables stay as they were.
    #[instrument(level = "info", skip_all, fields(totals = totals.len(), deltas = deltas.len()))]
    pub fn replace_all(
        &mut self,
        totals: &[CumulativeRow],
        deltas: &[DeltaRow],
    ) -> Result<WriteCounts> {
        let tx = self
            .conn
            .transaction()
            .context("starting write transaction")?;

        write_totals(&tx, totals).with_context(|| format!("writing {}", TOTAL_TABLE))?;
        write_deltas(&tx, PYTHON_DELTA_TABLE, deltas)
            .with_context(|| format!("writing {}", PYTHON_DELTA_TABLE))?;
        let sql =
            create_sql_deltas(&tx).with_context(|| format!("deriving {}", SQL_DELTA_TABLE))?;

        tx.commit().context("committing write transaction")?;
        let counts = WriteCounts {
            total: totals.len(),
            python: deltas.len(),
            sql,
        };
        info!(?counts, "replaced tables");
        Ok(counts)
    }

    /// Rebuild `deaths_change_sql` from whatever `deaths_total` holds now.
    pub fn derive_sql_deltas(&mut self) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let n = create_sql_deltas(&tx)?;
        tx.commit()?;
        Ok(n)
    }

    /// Most recent `limit` (date, cum_deaths) for `country`, newest first.
    pub fn latest_for_country(
        &self,
        country: &str,
        limit: usize,
    ) -> Result<Vec<(NaiveDate, i64)>> {
        let sql = format!(
            r#"SELECT "date", cum_deaths FROM {} WHERE country = ? ORDER BY "date" DESC LIMIT {}"#,
            TOTAL_TABLE, limit
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![country], |r| {
                Ok((r.get::<_, NaiveDate>(0)?, r.get::<_, i64>(1)?))
            })?
            .collect::<duckdb::Result<Vec<(NaiveDate, i64)>>>()
            .with_context(|| format!("reading latest rows for {}", country))?;
        Ok(rows)
    }

    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'main' ORDER BY table_name",
        )?;
        let names = stmt
            .query_map([], |r| r.get(0))?
            .collect::<duckdb::Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn row_count(&self, table: &str) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row(&format!(r#"SELECT COUNT(*) FROM "{}""#, table), [], |r| r.get(0))
            .with_context(|| format!("counting {}", table))?;
        Ok(n as usize)
    }

    pub fn load_totals(&self) -> Result<Vec<CumulativeRow>> {
        let sql = format!(
            r#"SELECT country, "date", cum_deaths FROM {} ORDER BY country, "date""#,
            TOTAL_TABLE
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |r| {
                Ok(CumulativeRow {
                    country: r.get(0)?,
                    date: r.get(1)?,
                    cum_deaths: r.get(2)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Load one delta table ordered by (country, date).
    pub fn load_deltas(&self, table: &str) -> Result<Vec<DeltaRow>> {
        let sql = format!(
            r#"SELECT country, "date", cum_deaths, day_deaths FROM "{}" ORDER BY country, "date""#,
            table
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |r| {
                Ok(DeltaRow {
                    country: r.get(0)?,
                    date: r.get(1)?,
                    cum_deaths: r.get(2)?,
                    day_deaths: r.get(3)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()
            .with_context(|| format!("loading {}", table))?;
        Ok(rows)
    }

    /// Line up both delta tables by (country, date) and count disagreements.
    #[instrument(level = "info", skip(self))]
    pub fn compare_delta_tables(&self) -> Result<DeltaComparison> {
        let python = self.load_deltas(PYTHON_DELTA_TABLE)?;
        let sql = self.load_deltas(SQL_DELTA_TABLE)?;

        let mut mismatched = 0usize;
        for (p, s) in python.iter().zip(&sql) {
            if p != s {
                if mismatched < 5 {
                    warn!(python = ?p, sql = ?s, "delta tables disagree");
                }
                mismatched += 1;
            }
        }
        let cmp = DeltaComparison {
            python_rows: python.len(),
            sql_rows: sql.len(),
            mismatched,
        };
        debug!(?cmp);
        Ok(cmp)
    }

    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| e)
            .context("closing database")?;
        info!("database closed");
        Ok(())
    }
}

fn recreate(conn: &Connection, table: &str, columns: &str) -> Result<()> {
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} ({columns});"
    ))?;
    Ok(())
}

fn write_totals(conn: &Connection, rows: &[CumulativeRow]) -> Result<()> {
    recreate(
        conn,
        TOTAL_TABLE,
        r#"country VARCHAR NOT NULL, "date" DATE NOT NULL, cum_deaths BIGINT NOT NULL"#,
    )?;
    let mut appender = conn.appender(TOTAL_TABLE)?;
    appender.append_rows(rows.iter().map(|r| {
        [
            &r.country as &dyn ToSql,
            &r.date as &dyn ToSql,
            &r.cum_deaths as &dyn ToSql,
        ]
    }))?;
    appender.flush()?;
    Ok(())
}

fn write_deltas(conn: &Connection, table: &str, rows: &[DeltaRow]) -> Result<()> {
    recreate(
        conn,
        table,
        r#"country VARCHAR NOT NULL, "date" DATE NOT NULL, cum_deaths BIGINT NOT NULL, day_deaths BIGINT NOT NULL"#,
    )?;
    let mut appender = conn.appender(table)?;
    appender.append_rows(rows.iter().map(|r| {
        [
            &r.country as &dyn ToSql,
            &r.date as &dyn ToSql,
            &r.cum_deaths as &dyn ToSql,
            &r.day_deaths as &dyn ToSql,
        ]
    }))?;
    appender.flush()?;
    Ok(())
}

fn create_sql_deltas(conn: &Connection) -> Result<usize> {
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {};", SQL_DELTA_TABLE))?;
    conn.execute_batch(SQL_DELTA_QUERY)?;
    let n: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", SQL_DELTA_TABLE),
        [],
        |r| r.get(0),
    )?;
    Ok(n as usize)
}
