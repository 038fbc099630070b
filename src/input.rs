//! CSV ingestion of the channel list and the domain list.
//!
//! Channel list columns: `id,maxPages`. Domain list column: `url`.

use std::io::Read;
use std::path::Path;

use log::warn;
use serde::Deserialize;

use crate::dispatch::Keyed;

/// Page budget used when a row leaves `maxPages` empty.
pub const DEFAULT_PAGE_BUDGET: i64 = 1;

/// One feed to crawl. `page_budget` is kept signed so that bad input can be
/// represented and rejected by the processor instead of at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub id: String,
    pub page_budget: i64,
}

impl Source {
    pub fn new(id: &str, page_budget: i64) -> Self {
        Self {
            id: normalize_id(id),
            page_budget,
        }
    }
}

impl Keyed for Source {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Reduce `https://t.me/s/name`, `t.me/name`, `@name` and friends to the
/// bare channel slug.
pub fn normalize_id(raw: &str) -> String {
    let mut id = raw.trim();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = id.strip_prefix(scheme) {
            id = rest;
        }
    }
    for host in ["www.t.me/", "t.me/", "telegram.me/"] {
        if let Some(rest) = id.strip_prefix(host) {
            id = rest;
        }
    }
    if let Some(rest) = id.strip_prefix("s/") {
        id = rest;
    }
    id.trim_start_matches('@').trim_end_matches('/').to_string()
}

#[derive(Debug, Deserialize)]
struct ChannelRow {
    #[serde(default)]
    id: String,
    #[serde(rename = "maxPages", default)]
    max_pages: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DomainRow {
    #[serde(default)]
    url: String,
}

pub fn parse_sources<R: Read>(reader: R) -> Result<Vec<Source>, csv::Error> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut sources = Vec::new();
    for (line, row) in csv.deserialize::<ChannelRow>().enumerate() {
        match row {
            Ok(row) => sources.push(Source::new(
                &row.id,
                row.max_pages.unwrap_or(DEFAULT_PAGE_BUDGET),
            )),
            Err(e) => warn!("Skipping channel row {}: {}", line + 2, e),
        }
    }
    Ok(sources)
}

pub fn read_sources(path: &Path) -> Result<Vec<Source>, csv::Error> {
    parse_sources(std::fs::File::open(path)?)
}

pub fn parse_domains<R: Read>(reader: R) -> Result<Vec<String>, csv::Error> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut domains = Vec::new();
    for row in csv.deserialize::<DomainRow>() {
        let row = row?;
        if !row.url.is_empty() {
            domains.push(row.url);
        }
    }
    Ok(domains)
}

pub fn read_domains(path: &Path) -> Result<Vec<String>, csv::Error> {
    parse_domains(std::fs::File::open(path)?)
}
