//! Session-log discovery and per-file loading.
//!
//! A session log is a SQLite store holding a single `data` table: one time
//! column plus any number of parameter columns. Loading a file turns it into a
//! restored [`SeriesTable`] or a [`LoadOutcome::Skipped`] with a reason; it
//! never fails the caller.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use euvlog_core::data_processors::{coerce_column, TimestampProcessor};
use euvlog_core::models::{Column, RawColumn, RawTable, RawValue, SeriesTable};
use euvlog_core::restore::{GapRestorer, FAULT_COLUMN_CANDIDATES};
use euvlog_core::time_utils::TimeBaseResolver;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, warn};

use crate::classifier::FileClassifier;
use crate::error::{DataError, Result};

/// Table every session log stores its samples in.
pub const DEFAULT_TABLE_NAME: &str = "data";

/// Accepted time-column names (compared case-insensitively).
pub const TIME_COLUMN_NAMES: &[&str] = &["time", "timestamp", "datetime"];

// ── Configuration ─────────────────────────────────────────────────────────────

/// How session logs are located and read.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub table_name: String,
    pub time_columns: Vec<String>,
    /// Fault-indicator names in priority order.
    pub fault_candidates: Vec<String>,
    /// Skip files classified as monitoring logs.
    pub exclude_monitoring: bool,
    /// Concurrent loads; `None` derives a count from the hardware.
    pub max_workers: Option<usize>,
    pub busy_timeout: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            time_columns: TIME_COLUMN_NAMES.iter().map(|s| s.to_string()).collect(),
            fault_candidates: FAULT_COLUMN_CANDIDATES.iter().map(|s| s.to_string()).collect(),
            exclude_monitoring: true,
            max_workers: None,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

// ── Outcomes ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    Monitoring,
    Unreadable,
    NoTimeColumn,
    NoRequestedColumns,
    /// The load task itself died (panic or cancellation).
    TaskFailed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::Monitoring => "monitoring log",
            SkipReason::Unreadable => "unreadable",
            SkipReason::NoTimeColumn => "no time column",
            SkipReason::NoRequestedColumns => "no requested columns",
            SkipReason::TaskFailed => "load task failed",
        };
        f.write_str(text)
    }
}

/// Result of loading one file.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Loaded(Arc<SeriesTable>),
    Skipped { path: PathBuf, reason: SkipReason },
}

impl LoadOutcome {
    /// The loaded table, or `None` when the file was skipped.
    pub fn table(&self) -> Option<&Arc<SeriesTable>> {
        match self {
            LoadOutcome::Loaded(table) => Some(table),
            LoadOutcome::Skipped { .. } => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded(_))
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            LoadOutcome::Loaded(_) => None,
            LoadOutcome::Skipped { reason, .. } => Some(*reason),
        }
    }
}

// ── Discovery & schema ────────────────────────────────────────────────────────

/// `*.db` files directly inside `dir`, sorted by path.
pub fn discover_db_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        warn!("Data folder does not exist: {}", dir.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("db"))
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

fn open_read_only(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(busy_timeout)?;
    Ok(conn)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Column names of `table`, in schema order. Empty when the table is absent.
pub(crate) fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    rows.collect()
}

/// Column names of the session table in `path`.
pub fn read_schema(path: &Path, config: &LoaderConfig) -> Result<Vec<String>> {
    let conn = open_read_only(path, config.busy_timeout)?;
    let columns = table_columns(&conn, &config.table_name)?;
    if columns.is_empty() {
        return Err(DataError::MissingTable {
            path: path.to_path_buf(),
            table: config.table_name.clone(),
        });
    }
    Ok(columns)
}

/// First schema column whose name is on the time-column allow-list.
pub fn find_time_column<'a>(schema: &'a [String], time_columns: &[String]) -> Option<&'a str> {
    schema
        .iter()
        .find(|c| time_columns.iter().any(|t| t.eq_ignore_ascii_case(c)))
        .map(String::as_str)
}

/// Every column that is not a time column, i.e. the selectable parameters.
pub fn numeric_parameters(schema: &[String], time_columns: &[String]) -> Vec<String> {
    schema
        .iter()
        .filter(|c| !time_columns.iter().any(|t| t.eq_ignore_ascii_case(c)))
        .cloned()
        .collect()
}

// ── Reading ───────────────────────────────────────────────────────────────────

fn raw_value(value: ValueRef<'_>) -> RawValue {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => RawValue::Null,
        ValueRef::Integer(i) => RawValue::Integer(i),
        ValueRef::Real(f) => RawValue::Real(f),
        ValueRef::Text(bytes) => RawValue::Text(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Read `time_column` plus `columns` from the session table, uncoerced.
/// Time cells holding date-time text are classified as timestamps.
pub fn read_raw_table(
    path: &Path,
    config: &LoaderConfig,
    time_column: &str,
    columns: &[String],
) -> Result<RawTable> {
    let conn = open_read_only(path, config.busy_timeout)?;

    let select_list = std::iter::once(time_column)
        .chain(columns.iter().map(String::as_str))
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("SELECT {} FROM {}", select_list, quote_ident(&config.table_name));

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;

    let mut time = Vec::new();
    let mut values: Vec<Vec<RawValue>> = vec![Vec::new(); columns.len()];
    while let Some(row) = rows.next()? {
        time.push(TimestampProcessor::classify(raw_value(row.get_ref(0)?)));
        for (i, column) in values.iter_mut().enumerate() {
            column.push(raw_value(row.get_ref(i + 1)?));
        }
    }

    Ok(RawTable {
        source: path.to_path_buf(),
        time_column: time_column.to_string(),
        time,
        columns: columns
            .iter()
            .cloned()
            .zip(values)
            .map(|(name, values)| RawColumn { name, values })
            .collect(),
    })
}

/// Resolve times, coerce parameters and restore gaps.
pub fn to_series_table(
    raw: RawTable,
    fault_column: Option<&str>,
    targets: &[String],
) -> SeriesTable {
    let datetime = TimeBaseResolver::from_path(&raw.source).resolve(&raw.time);

    let mut coercion = BTreeMap::new();
    let columns = raw
        .columns
        .into_iter()
        .map(|raw_column| {
            let (values, stats) = coerce_column(&raw_column.values);
            if stats.failed > 0 {
                debug!(
                    column = %raw_column.name,
                    failed = stats.failed,
                    "unconvertible values set to null"
                );
            }
            coercion.insert(raw_column.name.clone(), stats);
            Column::new(raw_column.name, values)
        })
        .collect();

    let table = SeriesTable {
        source: Some(raw.source),
        datetime,
        columns,
        fault_column: None,
        coercion,
    };

    GapRestorer::restore(table, fault_column, targets)
}

/// Load one session log.
///
/// Requested parameters are restricted to those present; the fault column,
/// when found, is carried along and used for gap restoration.
pub fn try_load_one(
    path: &Path,
    requested: &[String],
    config: &LoaderConfig,
) -> Result<SeriesTable> {
    let schema = read_schema(path, config)?;

    let time_column = find_time_column(&schema, &config.time_columns)
        .ok_or_else(|| DataError::NoTimeColumn {
            path: path.to_path_buf(),
        })?
        .to_string();

    let mut present: Vec<String> = Vec::new();
    for name in requested {
        if name != &time_column && schema.contains(name) && !present.contains(name) {
            present.push(name.clone());
        }
    }
    if present.is_empty() {
        return Err(DataError::NoRequestedColumns {
            path: path.to_path_buf(),
        });
    }

    let fault_column = GapRestorer::find_fault_column(&config.fault_candidates, &schema)
        .map(str::to_string);
    let mut columns = present.clone();
    if let Some(fault) = &fault_column {
        if !columns.contains(fault) {
            columns.push(fault.clone());
        }
    }

    let raw = read_raw_table(path, config, &time_column, &columns)?;
    let rows = raw.len();
    let table = to_series_table(raw, fault_column.as_deref(), &present);

    debug!(
        file = %path.display(),
        rows,
        columns = present.len(),
        fault_column = fault_column.as_deref().unwrap_or("-"),
        "session log loaded"
    );
    Ok(table)
}

/// Soft-failing wrapper around [`try_load_one`]: every failure becomes a
/// [`LoadOutcome::Skipped`] and a warning.
pub fn load_one(path: &Path, requested: &[String], config: &LoaderConfig) -> LoadOutcome {
    let skipped = |reason| LoadOutcome::Skipped {
        path: path.to_path_buf(),
        reason,
    };

    if config.exclude_monitoring && FileClassifier::is_monitoring_file(path, requested) {
        debug!("Skipping monitoring log {}", path.display());
        return skipped(SkipReason::Monitoring);
    }

    match try_load_one(path, requested, config) {
        Ok(table) => LoadOutcome::Loaded(Arc::new(table)),
        Err(e) => {
            let reason = match e {
                DataError::NoTimeColumn { .. } => SkipReason::NoTimeColumn,
                DataError::NoRequestedColumns { .. } => SkipReason::NoRequestedColumns,
                _ => SkipReason::Unreadable,
            };
            warn!("Skipping {}: {}", path.display(), e);
            skipped(reason)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use tempfile::TempDir;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, 29)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn make_db(dir: &TempDir, name: &str, sql: &str) -> PathBuf {
        let path = dir.path().join(name);
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(sql).unwrap();
        path
    }

    fn session_db(dir: &TempDir) -> PathBuf {
        make_db(
            dir,
            "LEUS_2025-09-29.db",
            "CREATE TABLE data (Time REAL, laser_power_value REAL, temp TEXT, fault INTEGER);
             INSERT INTO data VALUES (36000, 5.0, '20.5', 0);
             INSERT INTO data VALUES (36001, NULL, 'n/a', NULL);
             INSERT INTO data VALUES (36002, NULL, NULL, 1);
             INSERT INTO data VALUES (36003, 7.0, '21', 0);
             INSERT INTO data VALUES (36004, NULL, NULL, 0);",
        )
    }

    fn req(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    // ── discovery & schema ────────────────────────────────────────────────────

    #[test]
    fn test_discover_db_files_flat_and_sorted() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.db"), b"").unwrap();
        std::fs::write(dir.path().join("a.DB"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.db"), b"").unwrap();

        let files = discover_db_files(dir.path());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.DB", "b.db"]);
    }

    #[test]
    fn test_discover_db_files_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(discover_db_files(&dir.path().join("nope")).is_empty());
    }

    #[test]
    fn test_read_schema_and_parameters() {
        let dir = TempDir::new().unwrap();
        let path = session_db(&dir);
        let config = LoaderConfig::default();

        let schema = read_schema(&path, &config).unwrap();
        assert_eq!(schema, req(&["Time", "laser_power_value", "temp", "fault"]));
        assert_eq!(find_time_column(&schema, &config.time_columns), Some("Time"));
        assert_eq!(
            numeric_parameters(&schema, &config.time_columns),
            req(&["laser_power_value", "temp", "fault"])
        );
    }

    #[test]
    fn test_read_schema_missing_table() {
        let dir = TempDir::new().unwrap();
        let path = make_db(&dir, "2025-09-29.db", "CREATE TABLE other (time REAL);");
        let err = read_schema(&path, &LoaderConfig::default()).unwrap_err();
        assert!(matches!(err, DataError::MissingTable { .. }));
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    // ── load_one ──────────────────────────────────────────────────────────────

    #[test]
    fn test_load_one_builds_restored_table() {
        let dir = TempDir::new().unwrap();
        let path = session_db(&dir);

        let outcome = load_one(
            &path,
            &req(&["laser_power_value", "temp", "missing"]),
            &LoaderConfig::default(),
        );
        let table = outcome.table().expect("loaded");

        assert_eq!(table.source.as_deref(), Some(path.as_path()));
        assert_eq!(table.datetime[0], Some(at(10, 0, 0)));
        assert_eq!(table.datetime[4], Some(at(10, 0, 4)));
        assert_eq!(table.column_names(), vec!["laser_power_value", "temp", "fault"]);
        assert_eq!(table.fault_column.as_deref(), Some("fault"));

        // Row 1 fills from row 0; row 2 is a fault; row 4 fills from row 3.
        assert_eq!(
            table.column("laser_power_value").unwrap().values,
            vec![Some(5.0), Some(5.0), None, Some(7.0), Some(7.0)]
        );
        // "n/a" fails coercion, then the null is filled within the run.
        assert_eq!(
            table.column("temp").unwrap().values,
            vec![Some(20.5), Some(20.5), None, Some(21.0), Some(21.0)]
        );
        let stats = table.coercion["temp"];
        assert_eq!((stats.converted, stats.failed, stats.null), (2, 1, 2));
    }

    #[test]
    fn test_load_one_text_timestamps_keep_time_of_day() {
        let dir = TempDir::new().unwrap();
        let path = make_db(
            &dir,
            "2025-09-29_run.db",
            "CREATE TABLE data (timestamp TEXT, p REAL);
             INSERT INTO data VALUES ('1999-01-01 08:30:00', 1.0);
             INSERT INTO data VALUES (NULL, 2.0);",
        );
        let outcome = load_one(&path, &req(&["p"]), &LoaderConfig::default());
        let table = outcome.table().unwrap();
        assert_eq!(table.datetime, vec![Some(at(8, 30, 0)), None]);
        assert!(table.fault_column.is_none());
    }

    #[test]
    fn test_load_one_skip_reasons() {
        let dir = TempDir::new().unwrap();
        let config = LoaderConfig::default();

        let no_time = make_db(&dir, "2025-09-29_a.db", "CREATE TABLE data (p REAL);");
        assert_eq!(
            load_one(&no_time, &req(&["p"]), &config).skip_reason(),
            Some(SkipReason::NoTimeColumn)
        );

        let session = session_db(&dir);
        assert_eq!(
            load_one(&session, &req(&["ghost"]), &config).skip_reason(),
            Some(SkipReason::NoRequestedColumns)
        );

        let corrupt = dir.path().join("2025-09-29_b.db");
        std::fs::write(&corrupt, vec![b'x'; 4096]).unwrap();
        assert_eq!(
            load_one(&corrupt, &req(&["p"]), &config).skip_reason(),
            Some(SkipReason::Unreadable)
        );

        let monitoring = make_db(
            &dir,
            "2025-09-29_cnt.db",
            "CREATE TABLE data (time REAL, p REAL);",
        );
        assert_eq!(
            load_one(&monitoring, &req(&["p"]), &config).skip_reason(),
            Some(SkipReason::Monitoring)
        );

        let keep_all = LoaderConfig {
            exclude_monitoring: false,
            ..LoaderConfig::default()
        };
        assert!(load_one(&monitoring, &req(&["p"]), &keep_all).is_loaded());
    }

    #[test]
    fn test_load_one_custom_fault_candidates() {
        let dir = TempDir::new().unwrap();
        let path = make_db(
            &dir,
            "2025-09-29.db",
            "CREATE TABLE data (time REAL, p REAL, link_down INTEGER);
             INSERT INTO data VALUES (0, 1.0, 0);
             INSERT INTO data VALUES (1, NULL, 1);",
        );
        let config = LoaderConfig {
            fault_candidates: req(&["link_down"]),
            ..LoaderConfig::default()
        };
        let outcome = load_one(&path, &req(&["p"]), &config);
        let table = outcome.table().unwrap();
        assert_eq!(table.fault_column.as_deref(), Some("link_down"));
        assert_eq!(table.column("p").unwrap().values, vec![Some(1.0), None]);
    }
}
