use anyhow::Result;
use covid_etl::{config::CONFIG_FILE, pipeline, PipelineConfig};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configure ────────────────────────────────────────────────
    let cfg = PipelineConfig::load_or_default(CONFIG_FILE)?;
    info!(
        source = %cfg.source,
        db = %cfg.database.display(),
        policy = ?cfg.aggregation.policy,
        "config"
    );

    // ─── 3) run ──────────────────────────────────────────────────────
    let summary = pipeline::run(&cfg)?;
    info!(
        countries = summary.countries,
        deaths_total = summary.written.total,
        deaths_change_python = summary.written.python,
        deaths_change_sql = summary.written.sql,
        tables = ?summary.tables,
        "all done"
    );
    Ok(())
}
