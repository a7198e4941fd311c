use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ── RawValue ──────────────────────────────────────────────────────────────────

/// A single cell as it was stored in a session log, before any coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    /// A full date-time, either stored natively or recognised from text.
    Timestamp(NaiveDateTime),
}

impl RawValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }
}

// ── RawTable ──────────────────────────────────────────────────────────────────

/// One named column of raw, uncoerced cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub name: String,
    pub values: Vec<RawValue>,
}

/// One file's rows exactly as read: the raw time column plus the parameter
/// columns that were requested and present.
///
/// Created per load and discarded once the file has been turned into a
/// [`SeriesTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// File the rows were read from.
    pub source: PathBuf,
    /// Name of the column that matched the time-column allow-list.
    pub time_column: String,
    /// Raw time values, one per row.
    pub time: Vec<RawValue>,
    /// Parameter columns, in request order.
    pub columns: Vec<RawColumn>,
}

impl RawTable {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Look up a raw column by exact name.
    pub fn column(&self, name: &str) -> Option<&RawColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

// ── CoercionStats ─────────────────────────────────────────────────────────────

/// Tally of what happened when a raw column was coerced to numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoercionStats {
    /// Cells that were already integers or reals.
    pub native: usize,
    /// Non-numeric cells that were converted successfully (e.g. `"3.5"`).
    pub converted: usize,
    /// Non-null cells that could not be converted and became null.
    pub failed: usize,
    /// Cells that were null to begin with.
    pub null: usize,
}

impl CoercionStats {
    /// Total number of cells seen.
    pub fn total(&self) -> usize {
        self.native + self.converted + self.failed + self.null
    }
}

// ── Column / SeriesTable ──────────────────────────────────────────────────────

/// A numeric column where `None` marks a missing sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Number of non-null samples.
    pub fn non_null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

/// A time-indexed numeric table: one file after restoration, or the merged
/// timeline built from many files.
///
/// Every column has exactly `datetime.len()` entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesTable {
    /// Source file, when the table was loaded from a single file.
    pub source: Option<PathBuf>,
    /// Absolute sample times; `None` when the raw time could not be resolved.
    pub datetime: Vec<Option<NaiveDateTime>>,
    /// Parameter columns, in request order.
    pub columns: Vec<Column>,
    /// Name of the link-fault indicator column, if one was found.
    pub fault_column: Option<String>,
    /// Per-column coercion tallies recorded at load time.
    pub coercion: BTreeMap<String, CoercionStats>,
}

impl SeriesTable {
    /// Create a table from a datetime column and parameter columns.
    pub fn new(datetime: Vec<Option<NaiveDateTime>>, columns: Vec<Column>) -> Self {
        Self {
            datetime,
            columns,
            ..Default::default()
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.datetime.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datetime.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Column names in table order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Build a new table holding only the given row indices, in the given
    /// order. Metadata (`fault_column`, `coercion`, `source`) is carried over.
    pub fn select_rows(&self, rows: &[usize]) -> SeriesTable {
        let datetime = rows.iter().map(|&i| self.datetime[i]).collect();
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), rows.iter().map(|&i| c.values[i]).collect()))
            .collect();

        SeriesTable {
            source: self.source.clone(),
            datetime,
            columns,
            fault_column: self.fault_column.clone(),
            coercion: self.coercion.clone(),
        }
    }

    /// Indices of rows whose datetime lies in `[start, end]` (inclusive).
    /// Rows without a datetime never match.
    pub fn rows_between(&self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<usize> {
        self.datetime
            .iter()
            .enumerate()
            .filter_map(|(i, dt)| match dt {
                Some(t) if *t >= start && *t <= end => Some(i),
                _ => None,
            })
            .collect()
    }

    /// Earliest and latest non-null datetime.
    pub fn time_bounds(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let mut iter = self.datetime.iter().flatten();
        let first = *iter.next()?;
        let (min, max) = iter.fold((first, first), |(lo, hi), t| (lo.min(*t), hi.max(*t)));
        Some((min, max))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
