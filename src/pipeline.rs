// src/pipeline.rs
use crate::config::PipelineConfig;
use crate::duck::{DeathsStore, DeltaComparison, WriteCounts};
use crate::fetch::{self, Source};
use crate::process::{aggregate, delta, reshape, RawTable};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::blocking::Client;
use std::time::Instant;
use tracing::{info, instrument};

/// What one run wrote and read back.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub countries: usize,
    pub written: WriteCounts,
    pub comparison: DeltaComparison,
    /// Probe read-back for the configured country, newest first.
    pub latest: Vec<(NaiveDate, i64)>,
    pub tables: Vec<String>,
}

/// Fetch, aggregate, reshape, difference, persist, verify.
#[instrument(level = "info", skip_all, fields(source = %cfg.source, db = %cfg.database.display()))]
pub fn run(cfg: &PipelineConfig) -> Result<RunSummary> {
    let start = Instant::now();

    // ─── 1) fetch & clean ────────────────────────────────────────────
    let source = Source::parse(&cfg.source)?;
    let client = Client::new();
    let body = fetch::fetch_csv(&client, &source)?;
    let raw = RawTable::from_csv(&body).context("parsing source CSV")?;
    drop(body);

    // ─── 2) aggregate by country ─────────────────────────────────────
    let agg = aggregate::aggregate_by_country(&raw, &cfg.aggregation)?;
    drop(raw);

    // ─── 3) reshape to long form ─────────────────────────────────────
    let totals = reshape::to_long(&agg)?;

    // ─── 4) application-path deltas ──────────────────────────────────
    let deltas = delta::compute_daily_deltas(&totals)?;

    // ─── 5) persist (sql-path deltas derived in the same transaction) ─
    let mut store = DeathsStore::open(&cfg.database)?;
    let written = store.replace_all(&totals, &deltas)?;

    // ─── 6) verify ───────────────────────────────────────────────────
    let latest = store.latest_for_country(&cfg.verify.country, cfg.verify.latest)?;
    for (date, cum) in &latest {
        info!(country = %cfg.verify.country, %date, cum_deaths = cum, "latest reported");
    }
    let comparison = store.compare_delta_tables()?;
    if !comparison.is_equivalent() {
        anyhow::bail!("delta tables disagree: {:?}", comparison);
    }
    let tables = store.table_names()?;
    store.close()?;

    info!(elapsed = ?start.elapsed(), ?tables, "pipeline done");
    Ok(RunSummary {
        countries: agg.rows.len(),
        written,
        comparison,
        latest,
        tables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AggregationPolicy;
    use crate::duck::{PYTHON_DELTA_TABLE, SQL_DELTA_TABLE, TOTAL_TABLE};
    use anyhow::Result;
    use std::fs;
    use std::path::Path;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,covid_etl=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    const SOURCE: &str = "Province/State,Country/Region,Lat,Long,1/22/20,1/23/20\n\
                          ,X,1.0,2.0,10,20\n\
                          Overseas,X,3.0,4.0,5,8\n\
                          ,Y,5.0,6.0,0,2\n";

    fn config(dir: &Path, csv: &str) -> Result<PipelineConfig> {
        let src = dir.join("deaths.csv");
        fs::write(&src, csv)?;
        let mut cfg = PipelineConfig::default();
        cfg.source = src.display().to_string();
        cfg.database = dir.join("covid_d.duckdb");
        cfg.verify.country = "X".into();
        cfg.verify.latest = 3;
        Ok(cfg)
    }

    #[test]
    fn end_to_end_sub_regions() -> Result<()> {
        init_test_logging();
        let dir = tempfile::tempdir()?;
        let cfg = config(dir.path(), SOURCE)?;

        let summary = run(&cfg)?;
        assert_eq!(summary.countries, 2);
        assert_eq!(summary.written.total, 4);
        assert!(summary.comparison.is_equivalent());
        assert_eq!(
            summary.tables,
            vec![PYTHON_DELTA_TABLE, SQL_DELTA_TABLE, TOTAL_TABLE]
        );
        let jan = |d| NaiveDate::from_ymd_opt(2020, 1, d).unwrap();
        assert_eq!(summary.latest, vec![(jan(23), 28), (jan(22), 15)]);

        let store = DeathsStore::open(&cfg.database)?;
        for table in [PYTHON_DELTA_TABLE, SQL_DELTA_TABLE] {
            let x: Vec<(i64, i64)> = store
                .load_deltas(table)?
                .into_iter()
                .filter(|r| r.country == "X")
                .map(|r| (r.cum_deaths, r.day_deaths))
                .collect();
            assert_eq!(x, vec![(15, 13), (28, 0)], "{table}");
        }
        Ok(())
    }

    #[test]
    fn rerun_replaces_instead_of_appending() -> Result<()> {
        init_test_logging();
        let dir = tempfile::tempdir()?;
        let cfg = config(dir.path(), SOURCE)?;

        run(&cfg)?;
        let store = DeathsStore::open(&cfg.database)?;
        let first = (
            store.load_totals()?,
            store.load_deltas(PYTHON_DELTA_TABLE)?,
            store.load_deltas(SQL_DELTA_TABLE)?,
        );
        store.close()?;

        run(&cfg)?;
        let store = DeathsStore::open(&cfg.database)?;
        assert_eq!(store.load_totals()?, first.0);
        assert_eq!(store.load_deltas(PYTHON_DELTA_TABLE)?, first.1);
        assert_eq!(store.load_deltas(SQL_DELTA_TABLE)?, first.2);
        for table in [TOTAL_TABLE, PYTHON_DELTA_TABLE, SQL_DELTA_TABLE] {
            assert_eq!(store.row_count(table)?, 4, "{table}");
        }
        Ok(())
    }

    #[test]
    fn principal_policy_flows_through() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut cfg = config(dir.path(), SOURCE)?;
        cfg.aggregation.policy = AggregationPolicy::Principal;

        let summary = run(&cfg)?;
        let jan = |d| NaiveDate::from_ymd_opt(2020, 1, d).unwrap();
        assert_eq!(summary.latest, vec![(jan(23), 20), (jan(22), 10)]);
        Ok(())
    }

    #[test]
    fn bad_source_aborts_before_touching_the_database() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let csv = "Province/State,Country/Region,Lat,Long,1/22/20\n,X,0,0,many\n";
        let cfg = config(dir.path(), csv)?;

        assert!(run(&cfg).is_err());
        assert!(!cfg.database.exists());
        Ok(())
    }
}
