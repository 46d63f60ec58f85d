// src/process/delta.rs
use crate::process::reshape::CumulativeRow;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{info, instrument};

/// One `deaths_change_*` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaRow {
    pub country: String,
    pub date: NaiveDate,
    pub cum_deaths: i64,
    pub day_deaths: i64,
}

/// Forward difference over one chronologically ordered series: each day gets
/// `next - current`, the last day gets 0. A difference outside `i64` is an
/// error naming the date.
pub fn forward_differences(series: &[(NaiveDate, i64)]) -> Result<Vec<(NaiveDate, i64, i64)>> {
    series
        .iter()
        .enumerate()
        .map(|(i, &(date, cum))| {
            let day = match series.get(i + 1) {
                Some(&(_, next)) => next.checked_sub(cum).with_context(|| {
                    format!("daily change after {} overflows ({} - {})", date, next, cum)
                })?,
                None => 0,
            };
            Ok((date, cum, day))
        })
        .collect()
}

/// Group by country, sort each series by date, difference it, and concatenate
/// in (country, date) order. Input order does not matter.
#[instrument(level = "info", skip_all, fields(rows = rows.len()))]
pub fn compute_daily_deltas(rows: &[CumulativeRow]) -> Result<Vec<DeltaRow>> {
    let mut by_country: BTreeMap<&str, Vec<(NaiveDate, i64)>> = BTreeMap::new();
    for r in rows {
        by_country
            .entry(r.country.as_str())
            .or_default()
            .push((r.date, r.cum_deaths));
    }

    let mut out = Vec::with_capacity(rows.len());
    for (country, mut series) in by_country {
        series.sort_by_key(|&(date, _)| date);
        let diffs = forward_differences(&series)
            .with_context(|| format!("country {}, column cum_deaths", country))?;
        out.extend(
            diffs
                .into_iter()
                .map(|(date, cum_deaths, day_deaths)| DeltaRow {
                    country: country.to_string(),
                    date,
                    cum_deaths,
                    day_deaths,
                }),
        );
    }

    info!(rows = out.len(), "computed daily deltas");
    Ok(out)
}
