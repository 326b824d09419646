//! Region data sources
//!
//! This module defines the contract for retrieving raw per-day records and
//! provides a file-backed implementation. Records arrive as NDJSON (one
//! record per line) or a JSON array, are filtered to the requested region,
//! sorted by date, and checked for internal consistency.

use std::path::PathBuf;

use crate::error::PipelineError;
use crate::types::{RawDailyRecord, RegionSelector};

/// Trait for retrieving the raw per-day record stream for a region
pub trait RegionDataSource {
    /// Fetch all records for the region, ordered by date
    fn fetch(&self, region: &RegionSelector) -> Result<Vec<RawDailyRecord>, PipelineError>;
}

/// Parse a JSON string containing an array of records
pub fn parse_array(json: &str) -> Result<Vec<RawDailyRecord>, PipelineError> {
    let records: Vec<RawDailyRecord> = serde_json::from_str(json)?;
    Ok(records)
}

/// Parse NDJSON (newline-delimited JSON) containing one record per line
pub fn parse_ndjson(ndjson: &str) -> Result<Vec<RawDailyRecord>, PipelineError> {
    let mut records = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<RawDailyRecord>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => {
                return Err(PipelineError::Data(format!(
                    "Failed to parse record on line {}: {}",
                    line_num + 1,
                    e
                )));
            }
        }
    }
    Ok(records)
}

/// Filter records to one region, sort by date, and validate consistency.
///
/// Records with no region fields are kept (single-region files need no
/// tagging). A record with a region field set must match the selector.
pub fn select_region(
    mut records: Vec<RawDailyRecord>,
    region: &RegionSelector,
) -> Result<Vec<RawDailyRecord>, PipelineError> {
    records.retain(|r| {
        r.country.as_deref().map_or(true, |c| c == region.country)
            && r.state.as_deref().map_or(true, |s| s == region.state)
            && r.county.as_deref().map_or(true, |c| c == region.county)
    });

    if records.is_empty() {
        return Err(PipelineError::Data(format!(
            "no records for {}, {}, {}",
            region.county, region.state, region.country
        )));
    }

    records.sort_by_key(|r| r.date);

    for pair in records.windows(2) {
        if pair[0].date == pair[1].date {
            return Err(PipelineError::Data(format!(
                "duplicate record for {}",
                pair[0].date
            )));
        }
    }

    let population = records[0].population;
    if population == 0 {
        return Err(PipelineError::Data(
            "population is zero".to_string(),
        ));
    }
    for record in &records {
        if record.population != population {
            return Err(PipelineError::Data(format!(
                "population changes mid-series on {} ({} vs {})",
                record.date, record.population, population
            )));
        }
        if record.cases < 0.0 {
            return Err(PipelineError::Data(format!(
                "negative case count on {}",
                record.date
            )));
        }
    }

    Ok(records)
}

/// File-backed record source reading NDJSON or a JSON array
pub struct FileSource {
    path: PathBuf,
    format: FileFormat,
}

/// On-disk record layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Newline-delimited JSON, one record per line
    Ndjson,
    /// JSON array of records
    Json,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, format: FileFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }
}

impl RegionDataSource for FileSource {
    fn fetch(&self, region: &RegionSelector) -> Result<Vec<RawDailyRecord>, PipelineError> {
        let raw = std::fs::read_to_string(&self.path)?;
        let records = match self.format {
            FileFormat::Ndjson => parse_ndjson(&raw)?,
            FileFormat::Json => parse_array(&raw)?,
        };
        select_region(records, region)
    }
}

/// In-memory record source, used in tests and by embedding callers that
/// already hold the records
pub struct MemorySource {
    records: Vec<RawDailyRecord>,
}

impl MemorySource {
    pub fn new(records: Vec<RawDailyRecord>) -> Self {
        Self { records }
    }
}

impl RegionDataSource for MemorySource {
    fn fetch(&self, region: &RegionSelector) -> Result<Vec<RawDailyRecord>, PipelineError> {
        select_region(self.records.clone(), region)
    }
}
