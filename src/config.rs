// src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// JHU CSSE global deaths time series.
pub const DEFAULT_SOURCE: &str = "https://raw.githubusercontent.com/CSSEGISandData/COVID-19/master/\
csse_covid_19_data/csse_covid_19_time_series/time_series_covid19_deaths_global.csv";

/// Looked up in the working directory; optional.
pub const CONFIG_FILE: &str = "covid_etl.yaml";

/// How sub-national rows of one country are consolidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// Sum every row reported for the country.
    #[default]
    Sum,
    /// Keep only the row with an empty sub-region when the country has one,
    /// otherwise fall back to summing its sub-regions.
    Principal,
}

/// Source header names the aggregation step keys on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnNames {
    pub region: String,
    pub country: String,
    pub lat: String,
    pub long: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            region: "Province/State".into(),
            country: "Country/Region".into(),
            lat: "Lat".into(),
            long: "Long".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AggregationConfig {
    pub policy: AggregationPolicy,
    /// Sub-region labels dropped before grouping.
    pub excluded_regions: Vec<String>,
    pub columns: ColumnNames,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            policy: AggregationPolicy::Sum,
            excluded_regions: Vec::new(),
            columns: ColumnNames::default(),
        }
    }
}

/// The read-back query run after persisting.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerifyConfig {
    pub country: String,
    pub latest: usize,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            country: "Australia".into(),
            latest: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// `http(s)://` URL, `file://` URL or plain filesystem path.
    pub source: String,
    /// DuckDB database file.
    pub database: PathBuf,
    pub aggregation: AggregationConfig,
    pub verify: VerifyConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.into(),
            database: PathBuf::from("covid_d.duckdb"),
            aggregation: AggregationConfig::default(),
            verify: VerifyConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing pipeline config")
    }

    /// Read `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let cfg = Self::from_yaml(&text).with_context(|| format!("in {}", path.display()))?;
        info!(path = %path.display(), "loaded config");
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn partial_yaml_keeps_defaults() -> Result<()> {
        let cfg = PipelineConfig::from_yaml(
            r#"
database: /tmp/deaths.duckdb
aggregation:
  policy: principal
  excluded_regions: ["Unknown"]
"#,
        )?;
        assert_eq!(cfg.source, DEFAULT_SOURCE);
        assert_eq!(cfg.database, PathBuf::from("/tmp/deaths.duckdb"));
        assert_eq!(cfg.aggregation.policy, AggregationPolicy::Principal);
        assert_eq!(cfg.aggregation.excluded_regions, vec!["Unknown".to_string()]);
        assert_eq!(cfg.aggregation.columns.country, "Country/Region");
        assert_eq!(cfg.verify, VerifyConfig::default());
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(PipelineConfig::from_yaml("sorce: nowhere\n").is_err());
        assert!(PipelineConfig::from_yaml("aggregation:\n  policy: average\n").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg = PipelineConfig::load_or_default(dir.path().join(CONFIG_FILE))?;
        assert_eq!(cfg, PipelineConfig::default());
        Ok(())
    }

    #[test]
    fn load_reads_file() -> Result<()> {
        let mut f = NamedTempFile::new()?;
        writeln!(f, "verify:\n  country: France\n  latest: 5")?;
        let cfg = PipelineConfig::load_or_default(f.path())?;
        assert_eq!(cfg.verify.country, "France");
        assert_eq!(cfg.verify.latest, 5);
        Ok(())
    }
}
