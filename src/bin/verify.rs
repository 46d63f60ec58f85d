// src/bin/verify.rs
//
// Re-check an existing database: row counts per table and agreement between
// the two delta tables. Usage: `verify [DB_PATH]`.

use anyhow::Result;
use covid_etl::config::CONFIG_FILE;
use covid_etl::duck::{DeathsStore, PYTHON_DELTA_TABLE, SQL_DELTA_TABLE, TOTAL_TABLE};
use covid_etl::PipelineConfig;
use std::path::PathBuf;

fn main() -> Result<()> {
    let db_path = match std::env::args().nth(1) {
        Some(p) => PathBuf::from(p),
        None => PipelineConfig::load_or_default(CONFIG_FILE)?.database,
    };
    if !db_path.exists() {
        anyhow::bail!("no database at {}", db_path.display());
    }

    let store = DeathsStore::open(&db_path)?;

    println!("\n{: <25} {:>15}", "Table", "Rows");
    println!("{:-<41}", "");
    for table in [TOTAL_TABLE, PYTHON_DELTA_TABLE, SQL_DELTA_TABLE] {
        println!("{: <25} {:>15}", table, store.row_count(table)?);
    }

    let cmp = store.compare_delta_tables()?;
    println!(
        "\n{} vs {}: {} / {} rows, {} mismatched",
        PYTHON_DELTA_TABLE, SQL_DELTA_TABLE, cmp.python_rows, cmp.sql_rows, cmp.mismatched
    );
    store.close()?;

    if !cmp.is_equivalent() {
        anyhow::bail!("delta tables disagree");
    }
    Ok(())
}
