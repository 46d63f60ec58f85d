// src/process/mod.rs
pub mod aggregate;
pub mod date_parser;
pub mod delta;
pub mod reshape;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};
use std::collections::HashSet;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    /// Column names from the header row, trimmed.
    pub headers: Vec<String>,
    /// Every row, padded to `headers.len()`. Missing cells are `""`.
    pub rows: Vec<Vec<String>>,
    /// 1-based CSV line each row started on, parallel to `rows`.
    pub lines: Vec<u64>,
}

impl RawTable {
    /// Parse the retrieved CSV body. Fields are whitespace-trimmed; short
    /// records are padded with the empty-string sentinel.
    #[instrument(level = "info", skip(text), fields(bytes = text.len()))]
    pub fn from_csv(text: &str) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = rdr
            .headers()
            .context("reading CSV header row")?
            .iter()
            .map(str::to_string)
            .collect();
        if headers.iter().all(String::is_empty) {
            anyhow::bail!("CSV has an empty header row");
        }
        let mut seen = HashSet::with_capacity(headers.len());
        for h in &headers {
            if !seen.insert(h.as_str()) {
                anyhow::bail!("duplicate CSV column {:?}", h);
            }
        }

        let width = headers.len();
        let mut rows = Vec::new();
        let mut lines = Vec::new();
        let mut blanks = 0usize;
        for (idx, result) in rdr.records().enumerate() {
            // header is line 1; used only when csv reports no position
            let fallback = idx as u64 + 2;
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    let line = e.position().map_or(fallback, |p| p.line());
                    return Err(anyhow::Error::new(e)
                        .context(format!("CSV parse error on line {}", line)));
                }
            };
            let line = record.position().map_or(fallback, |p| p.line());
            if record.len() > width {
                anyhow::bail!(
                    "record on line {} has {} fields, header has {}",
                    line,
                    record.len(),
                    width
                );
            }
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(width, String::new());
            blanks += row.iter().filter(|c| c.is_empty()).count();
            rows.push(row);
            lines.push(line);
        }

        info!(rows = rows.len(), columns = width, blanks, "loaded raw table");
        debug!(?headers);
        Ok(Self {
            headers,
            rows,
            lines,
        })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// CSV line of row `idx`, for error messages.
    pub fn line(&self, idx: usize) -> u64 {
        self.lines.get(idx).copied().unwrap_or(idx as u64 + 2)
    }
}
