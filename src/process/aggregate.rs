// src/process/aggregate.rs
use crate::config::{AggregationConfig, AggregationPolicy};
use crate::process::RawTable;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, instrument, warn};

/// One row per country, one column per (still textual) date header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryAggregate {
    pub date_headers: Vec<String>,
    /// Values line up with `date_headers`.
    pub rows: BTreeMap<String, Vec<i64>>,
}

impl CountryAggregate {
    pub fn get(&self, country: &str, header: &str) -> Option<i64> {
        let col = self.date_headers.iter().position(|h| h == header)?;
        self.rows.get(country).map(|vals| vals[col])
    }
}

#[derive(Default)]
struct Accumulator {
    /// Sum over rows with an empty sub-region.
    principal: Option<Vec<i64>>,
    all: Vec<i64>,
    entries: usize,
}

/// Element-wise `acc += vals`. On overflow returns the offending column and
/// leaves `acc` partially updated.
fn add_into(acc: &mut Vec<i64>, vals: &[i64]) -> std::result::Result<(), usize> {
    if acc.is_empty() {
        acc.resize(vals.len(), 0);
    }
    for (col, (a, v)) in acc.iter_mut().zip(vals).enumerate() {
        *a = a.checked_add(*v).ok_or(col)?;
    }
    Ok(())
}

/// Blank cells count as zero; `12.0` is accepted as 12.
pub fn parse_count(cell: &str) -> Result<i64> {
    if cell.is_empty() {
        return Ok(0);
    }
    if let Ok(v) = cell.parse::<i64>() {
        return Ok(v);
    }
    match cell.parse::<f64>() {
        // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
        Ok(f) if f.is_finite() && f.fract() == 0.0 => {
            if f < i64::MIN as f64 || f >= i64::MAX as f64 {
                anyhow::bail!("count out of range: {:?}", cell);
            }
            Ok(f as i64)
        }
        _ => anyhow::bail!("not an integer count: {:?}", cell),
    }
}

/// Drop the geo columns, rename the country column and consolidate rows per
/// country under `cfg.policy`.
#[instrument(level = "info", skip_all, fields(policy = ?cfg.policy))]
pub fn aggregate_by_country(raw: &RawTable, cfg: &AggregationConfig) -> Result<CountryAggregate> {
    let cols = &cfg.columns;
    let country_idx = raw
        .column_index(&cols.country)
        .with_context(|| format!("source has no {:?} column", cols.country))?;
    let region_idx = raw.column_index(&cols.region);

    let dropped = [
        Some(country_idx),
        region_idx,
        raw.column_index(&cols.lat),
        raw.column_index(&cols.long),
    ];
    let date_cols: Vec<usize> = (0..raw.headers.len())
        .filter(|i| !dropped.contains(&Some(*i)))
        .collect();
    let date_headers: Vec<String> = date_cols.iter().map(|&i| raw.headers[i].clone()).collect();

    let mut groups: HashMap<&str, Accumulator> = HashMap::new();
    let mut excluded = 0usize;
    let mut negatives = 0usize;
    for (r, row) in raw.rows.iter().enumerate() {
        let line = raw.line(r);
        let country = row[country_idx].as_str();
        let region = region_idx.map(|i| row[i].as_str()).unwrap_or("");
        if country.is_empty() {
            warn!(line, region, "row without a country, skipping");
            continue;
        }
        if !region.is_empty() && cfg.excluded_regions.iter().any(|x| x == region) {
            excluded += 1;
            continue;
        }

        let vals = date_cols
            .iter()
            .map(|&c| {
                parse_count(&row[c]).with_context(|| {
                    format!("line {} ({}), column {:?}", line, country, raw.headers[c])
                })
            })
            .collect::<Result<Vec<i64>>>()?;
        for (&c, &v) in date_cols.iter().zip(&vals).filter(|(_, v)| **v < 0) {
            negatives += 1;
            warn!(line, country, column = %raw.headers[c], value = v, "negative count");
        }

        let overflow = |col: usize| {
            anyhow::anyhow!(
                "sum for {} overflows at column {:?} (line {})",
                country,
                date_headers[col],
                line
            )
        };
        let acc = groups.entry(country).or_default();
        acc.entries += 1;
        add_into(&mut acc.all, &vals).map_err(overflow)?;
        if region.is_empty() {
            add_into(acc.principal.get_or_insert_with(Vec::new), &vals).map_err(overflow)?;
        }
    }

    let mut multi: Vec<(&str, usize)> = groups
        .iter()
        .filter(|(_, a)| a.entries > 1)
        .map(|(c, a)| (*c, a.entries))
        .collect();
    multi.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    debug!(top = ?&multi[..multi.len().min(4)], "countries reported by sub-region");

    let width = date_headers.len();
    let rows: BTreeMap<String, Vec<i64>> = groups
        .into_iter()
        .map(|(country, acc)| {
            let mut vals = match (cfg.policy, acc.principal) {
                (AggregationPolicy::Principal, Some(p)) => p,
                _ => acc.all,
            };
            // a country with zero date columns still gets a row
            vals.resize(width, 0);
            (country.to_string(), vals)
        })
        .collect();

    info!(
        countries = rows.len(),
        dates = width,
        excluded,
        negatives,
        "aggregated by country"
    );
    Ok(CountryAggregate { date_headers, rows })
}
