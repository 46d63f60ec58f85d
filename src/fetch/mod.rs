// src/fetch/mod.rs

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use std::{fs, path::PathBuf};
use tracing::{debug, info, instrument};
use url::Url;

/// Where the raw CSV lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Http(Url),
    File(PathBuf),
}

impl Source {
    /// `http(s)://` and `file://` are parsed as URLs; anything else is a path.
    pub fn parse(raw: &str) -> Result<Self> {
        match Url::parse(raw) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => Ok(Source::Http(u)),
            Ok(u) if u.scheme() == "file" => u
                .to_file_path()
                .map(Source::File)
                .map_err(|_| anyhow::anyhow!("invalid file URL {}", raw)),
            Ok(u) if u.scheme().len() > 1 => anyhow::bail!("unsupported source scheme {}", u),
            // no scheme, or a windows drive letter
            _ => Ok(Source::File(PathBuf::from(raw))),
        }
    }
}

/// Retrieve the whole CSV body. No retries: any failure is returned as-is.
#[instrument(level = "info", skip(client))]
pub fn fetch_csv(client: &Client, source: &Source) -> Result<String> {
    let body = match source {
        Source::Http(url) => {
            debug!(%url, "GET");
            client
                .get(url.clone())
                .send()
                .with_context(|| format!("GET {} failed", url))?
                .error_for_status()
                .with_context(|| format!("Non-success status {}", url))?
                .text()
                .with_context(|| format!("Reading text from {}", url))?
        }
        Source::File(path) => {
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
        }
    };
    info!(bytes = body.len(), "fetched source");
    Ok(body)
}
