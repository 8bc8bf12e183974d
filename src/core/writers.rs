//! Writers for the accepted and dropped retention tables.
//!
//! - Accepted table: the truncated series of every accepted entity
//! - Dropped table: the full series of every dropped entity, with the reason
//!
//! Errored entities appear in neither table. Values are written with their
//! shortest round-trip representation, so reading a table back yields the
//! same `f64`s.

use std::ffi::OsString;
use std::fmt::Display;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use log::warn;
use thiserror::Error;

use crate::config::ColumnConfig;
use crate::core::series::{DropReason, Series};

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to move a finished table into place.
    #[error("failed to rename '{from}' to '{to}': {source}")]
    Rename {
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

fn create_csv_writer(path: &Path) -> Result<csv::Writer<BufWriter<File>>> {
    ensure_parent_dirs(path)?;
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(csv::Writer::from_writer(BufWriter::new(file)))
}

fn finish(mut writer: csv::Writer<BufWriter<File>>, path: &Path) -> Result<()> {
    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })
}

/// Sibling path a table is written to before being renamed into place.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|e| WriteError::Rename {
        from: from.display().to_string(),
        to: to.display().to_string(),
        source: e,
    })
}

fn discard(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!("could not remove '{}': {}", path.display(), e);
        }
    }
}

/// Write the truncated series of every accepted entity.
///
/// Columns: entity id, cycle, raw, smoothed (named after `columns`).
///
/// # Returns
///
/// The number of data rows written.
pub fn write_accepted_csv<'a, K, I>(path: &Path, entities: I, columns: &ColumnConfig) -> Result<usize>
where
    K: Display + 'a,
    I: IntoIterator<Item = (&'a str, &'a Series<K>)>,
{
    let mut writer = create_csv_writer(path)?;
    let path_str = path.display().to_string();
    let csv_err = |e| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    };

    writer
        .write_record([
            columns.entity_id.as_str(),
            columns.cycle.as_str(),
            columns.raw.as_str(),
            columns.smoothed.as_str(),
        ])
        .map_err(csv_err)?;

    let mut count = 0;
    for (entity_id, series) in entities {
        for point in series.points() {
            writer
                .write_record(&[
                    entity_id.to_string(),
                    point.index.to_string(),
                    point.raw.to_string(),
                    point.smoothed.to_string(),
                ])
                .map_err(csv_err)?;
            count += 1;
        }
    }

    finish(writer, path)?;
    Ok(count)
}

/// Write the full series of every dropped entity, with a `reason` column.
///
/// # Returns
///
/// The number of data rows written.
pub fn write_dropped_csv<'a, K, I>(path: &Path, entities: I, columns: &ColumnConfig) -> Result<usize>
where
    K: Display + 'a,
    I: IntoIterator<Item = (&'a str, &'a Series<K>, &'a DropReason)>,
{
    let mut writer = create_csv_writer(path)?;
    let path_str = path.display().to_string();
    let csv_err = |e| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    };

    writer
        .write_record([
            columns.entity_id.as_str(),
            columns.cycle.as_str(),
            columns.raw.as_str(),
            columns.smoothed.as_str(),
            "reason",
        ])
        .map_err(csv_err)?;

    let mut count = 0;
    for (entity_id, series, reason) in entities {
        let reason = reason.to_string();
        for point in series.points() {
            writer
                .write_record(&[
                    entity_id.to_string(),
                    point.index.to_string(),
                    point.raw.to_string(),
                    point.smoothed.to_string(),
                    reason.clone(),
                ])
                .map_err(csv_err)?;
            count += 1;
        }
    }

    finish(writer, path)?;
    Ok(count)
}

/// Write both tables, or neither.
///
/// Each table is first written to a `.tmp` sibling. Only once both are
/// complete are they renamed over `accepted_path` and `dropped_path`. On
/// failure the staged files are removed and any existing tables at the
/// final paths are left as they were.
///
/// # Returns
///
/// The number of accepted and dropped data rows written.
pub fn write_tables<'a, K, A, D>(
    accepted_path: &Path,
    accepted: A,
    dropped_path: &Path,
    dropped: D,
    columns: &ColumnConfig,
) -> Result<(usize, usize)>
where
    K: Display + 'a,
    A: IntoIterator<Item = (&'a str, &'a Series<K>)>,
    D: IntoIterator<Item = (&'a str, &'a Series<K>, &'a DropReason)>,
{
    let accepted_tmp = staging_path(accepted_path);
    let dropped_tmp = staging_path(dropped_path);

    let staged = write_accepted_csv(&accepted_tmp, accepted, columns).and_then(|accepted_rows| {
        write_dropped_csv(&dropped_tmp, dropped, columns).map(|dropped_rows| (accepted_rows, dropped_rows))
    });

    let counts = match staged {
        Ok(counts) => counts,
        Err(e) => {
            discard(&accepted_tmp);
            discard(&dropped_tmp);
            return Err(e);
        }
    };

    rename(&accepted_tmp, accepted_path).map_err(|e| {
        discard(&accepted_tmp);
        discard(&dropped_tmp);
        e
    })?;
    // The accepted table is already in place at this point.
    rename(&dropped_tmp, dropped_path).map_err(|e| {
        discard(accepted_path);
        discard(&dropped_tmp);
        e
    })?;

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::read_retention_records;
    use tempfile::tempdir;

    fn series(points: &[(i64, f64, f64)]) -> Series<i64> {
        let mut s = Series::new();
        for &(index, raw, smoothed) in points {
            s.push(index, raw, smoothed);
        }
        s
    }

    struct Fixture {
        accepted: Series<i64>,
        dropped: Series<i64>,
        reason: DropReason,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                accepted: series(&[(1, 0.92, 0.9), (2, 0.80, 0.85)]),
                dropped: series(&[(1, 0.52, 0.5), (2, 0.88, 0.9)]),
                reason: DropReason::StartsBelowFloor {
                    first: 0.5,
                    floor: 0.7,
                },
            }
        }

        fn accepted(&self) -> Vec<(&str, &Series<i64>)> {
            vec![("1", &self.accepted)]
        }

        fn dropped(&self) -> Vec<(&str, &Series<i64>, &DropReason)> {
            vec![("2", &self.dropped, &self.reason)]
        }
    }

    #[test]
    fn test_write_accepted_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("accepted.csv");
        let fixture = Fixture::new();

        let written = write_accepted_csv(&path, fixture.accepted(), &ColumnConfig::default()).unwrap();
        assert_eq!(written, 2);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines[0], "battery_file_id,Cyc_,DischargeCapacityRetention,Smoothed");
        assert_eq!(lines[1], "1,1,0.92,0.9");
        assert_eq!(lines[2], "1,2,0.8,0.85");
        assert_eq!(lines.len(), 3); // header + 2 data rows
    }

    #[test]
    fn test_write_dropped_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dropped.csv");
        let fixture = Fixture::new();

        let written = write_dropped_csv(&path, fixture.dropped(), &ColumnConfig::default()).unwrap();
        assert_eq!(written, 2);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert!(lines[0].ends_with(",reason"));
        assert!(lines[1].starts_with("2,1,0.52,0.5,"));
        assert!(lines[1].contains("starts below floor"));
        assert!(lines[2].starts_with("2,2,"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_values_keep_full_precision() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("accepted.csv");
        let near_ceiling = series(&[(1, 1.0500004, 1.0500004), (2, 0.123456789012, 0.7)]);

        write_accepted_csv(&path, [("a", &near_ceiling)], &ColumnConfig::default()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("a,1,1.0500004,1.0500004"));

        let records = read_retention_records(content.as_bytes(), &ColumnConfig::default()).unwrap();
        assert_eq!(records[0].smoothed, 1.0500004);
        assert_eq!(records[1].raw, 0.123456789012);
        assert_eq!(records[1].smoothed, 0.7);
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subdir").join("nested").join("accepted.csv");
        let fixture = Fixture::new();

        write_accepted_csv(&path, fixture.accepted(), &ColumnConfig::default()).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_write_tables() {
        let dir = tempdir().unwrap();
        let accepted = dir.path().join("accepted.csv");
        let dropped = dir.path().join("dropped.csv");
        let fixture = Fixture::new();

        let counts = write_tables(
            &accepted,
            fixture.accepted(),
            &dropped,
            fixture.dropped(),
            &ColumnConfig::default(),
        )
        .unwrap();

        assert_eq!(counts, (2, 2));
        assert!(accepted.exists());
        assert!(dropped.exists());
        assert!(!staging_path(&accepted).exists());
        assert!(!staging_path(&dropped).exists());
    }

    #[test]
    fn test_failed_dropped_write_leaves_no_accepted_table() {
        let dir = tempdir().unwrap();
        let accepted = dir.path().join("accepted.csv");
        // A regular file where the dropped table's directory should be.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let dropped = blocker.join("dropped.csv");
        let fixture = Fixture::new();

        let result = write_tables(
            &accepted,
            fixture.accepted(),
            &dropped,
            fixture.dropped(),
            &ColumnConfig::default(),
        );

        assert!(matches!(result, Err(WriteError::CreateFile { .. })));
        assert!(!accepted.exists());
        assert!(!staging_path(&accepted).exists());
    }

    #[test]
    fn test_failed_write_keeps_previous_tables() {
        let dir = tempdir().unwrap();
        let accepted = dir.path().join("accepted.csv");
        fs::write(&accepted, "previous run").unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let fixture = Fixture::new();

        let result = write_tables(
            &accepted,
            fixture.accepted(),
            &blocker.join("dropped.csv"),
            fixture.dropped(),
            &ColumnConfig::default(),
        );

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&accepted).unwrap(), "previous run");
    }

    #[test]
    fn test_staging_path() {
        assert_eq!(
            staging_path(Path::new("out/denoise_accepted.csv")),
            PathBuf::from("out/denoise_accepted.csv.tmp")
        );
    }
}
