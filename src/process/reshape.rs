// src/process/reshape.rs
use crate::process::aggregate::CountryAggregate;
use crate::process::date_parser::parse_header_date;
use anyhow::Result;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{info, instrument};

/// One `deaths_total` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CumulativeRow {
    pub country: String,
    pub date: NaiveDate,
    pub cum_deaths: i64,
}

/// Long table pivoted back to one column per date. `None` where a country has
/// no row for a date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideTable {
    pub dates: Vec<NaiveDate>,
    pub rows: BTreeMap<String, Vec<Option<i64>>>,
}

/// Parse every header and return `(date, column)` pairs in chronological order.
fn dated_columns(headers: &[String]) -> Result<Vec<(NaiveDate, usize)>> {
    let mut cols = headers
        .iter()
        .enumerate()
        .map(|(i, h)| match parse_header_date(h) {
            Some(d) => Ok((d, i)),
            None => anyhow::bail!("column {:?} is not a date", h),
        })
        .collect::<Result<Vec<_>>>()?;
    cols.sort();
    if let Some(w) = cols.windows(2).find(|w| w[0].0 == w[1].0) {
        anyhow::bail!(
            "columns {:?} and {:?} both name {}",
            headers[w[0].1],
            headers[w[1].1],
            w[0].0
        );
    }
    Ok(cols)
}

/// Wide → long, ordered by (country, date).
#[instrument(level = "info", skip_all)]
pub fn to_long(agg: &CountryAggregate) -> Result<Vec<CumulativeRow>> {
    let cols = dated_columns(&agg.date_headers)?;
    let mut out = Vec::with_capacity(agg.rows.len() * cols.len());
    for (country, vals) in &agg.rows {
        out.extend(cols.iter().map(|&(date, c)| CumulativeRow {
            country: country.clone(),
            date,
            cum_deaths: vals[c],
        }));
    }
    info!(rows = out.len(), "reshaped to long form");
    Ok(out)
}

/// Long → wide. Dates are the sorted union over all rows; a repeated
/// (country, date) keeps the last value.
pub fn pivot_wide(rows: &[CumulativeRow]) -> WideTable {
    let mut dates: Vec<NaiveDate> = rows.iter().map(|r| r.date).collect();
    dates.sort();
    dates.dedup();

    let mut wide: BTreeMap<String, Vec<Option<i64>>> = BTreeMap::new();
    for r in rows {
        // dates is sorted and contains r.date
        let col = dates.binary_search(&r.date).unwrap_or_default();
        wide.entry(r.country.clone())
            .or_insert_with(|| vec![None; dates.len()])[col] = Some(r.cum_deaths);
    }
    WideTable { dates, rows: wide }
}
