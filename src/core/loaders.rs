//! Loader for delimited capacity-retention tables.
//!
//! The expected input has a header row and one row per (entity, cycle)
//! measurement. Columns are located by name (case-insensitive), so extra
//! columns and arbitrary column order are tolerated.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use thiserror::Error;

use crate::config::ColumnConfig;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Parse error on line {line}: {message}")]
    ParseError { line: u64, message: String },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// One row of the retention table.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionRecord {
    pub entity_id: String,
    pub cycle: i64,
    pub raw: f64,
    pub smoothed: f64,
}

/// Column positions resolved from the header row.
#[derive(Debug, Clone, Copy)]
struct ColumnIndices {
    entity_id: usize,
    cycle: usize,
    raw: usize,
    smoothed: usize,
}

impl ColumnIndices {
    fn resolve(headers: &StringRecord, columns: &ColumnConfig) -> Result<Self> {
        let col_map: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_lowercase(), i))
            .collect();

        let mut missing = Vec::new();
        let mut lookup = |name: &str| -> usize {
            match col_map.get(&name.to_lowercase()) {
                Some(&idx) => idx,
                None => {
                    missing.push(name.to_string());
                    0
                }
            }
        };

        let indices = Self {
            entity_id: lookup(&columns.entity_id),
            cycle: lookup(&columns.cycle),
            raw: lookup(&columns.raw),
            smoothed: lookup(&columns.smoothed),
        };

        if !missing.is_empty() {
            return Err(LoaderError::MissingColumns(missing.join(", ")));
        }

        Ok(indices)
    }
}

/// Load a retention table from a CSV file.
///
/// # Arguments
///
/// * `path` - Path to the CSV file
/// * `columns` - Names of the entity id, cycle, raw and smoothed columns
///
/// # Errors
///
/// Returns an error if the file cannot be read, a required column is
/// missing, a cell cannot be parsed, or there are no data rows.
pub fn load_retention_csv<P: AsRef<Path>>(
    path: P,
    columns: &ColumnConfig,
) -> Result<Vec<RetentionRecord>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let records = read_retention_records(BufReader::new(file), columns)?;

    if records.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(records)
}

/// Parse retention records from any reader. Returns an empty vector when
/// there are no data rows.
pub fn read_retention_records<R: Read>(
    reader: R,
    columns: &ColumnConfig,
) -> Result<Vec<RetentionRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let idx = ColumnIndices::resolve(&headers, columns)?;

    let mut records = Vec::with_capacity(1024);

    for result in reader.records() {
        let record = result?;
        let line = record.position().map_or(0, |p| p.line());

        let entity_id = field(&record, idx.entity_id, line, &columns.entity_id)?;
        if entity_id.is_empty() {
            return Err(LoaderError::ParseError {
                line,
                message: format!("empty value for column '{}'", columns.entity_id),
            });
        }

        let cycle_text = field(&record, idx.cycle, line, &columns.cycle)?;
        let cycle = parse_cycle(cycle_text).ok_or_else(|| LoaderError::ParseError {
            line,
            message: format!("invalid cycle index '{}' in column '{}'", cycle_text, columns.cycle),
        })?;

        let raw = parse_value(field(&record, idx.raw, line, &columns.raw)?, line, &columns.raw)?;
        let smoothed = parse_value(
            field(&record, idx.smoothed, line, &columns.smoothed)?,
            line,
            &columns.smoothed,
        )?;

        records.push(RetentionRecord {
            entity_id: entity_id.to_string(),
            cycle,
            raw,
            smoothed,
        });
    }

    Ok(records)
}

fn field<'r>(record: &'r StringRecord, i: usize, line: u64, column: &str) -> Result<&'r str> {
    record.get(i).ok_or_else(|| LoaderError::ParseError {
        line,
        message: format!("missing value for column '{}'", column),
    })
}

/// Parse a cycle index, accepting integral floats such as `12.0`.
fn parse_cycle(s: &str) -> Option<i64> {
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    let v: f64 = s.parse().ok()?;
    if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

fn parse_value(s: &str, line: u64, column: &str) -> Result<f64> {
    s.parse::<f64>().map_err(|_| LoaderError::ParseError {
        line,
        message: format!("invalid number '{}' in column '{}'", s, column),
    })
}
