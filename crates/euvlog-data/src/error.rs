use std::path::PathBuf;

use euvlog_core::LogError;
use thiserror::Error;

/// Errors raised while reading or writing session-log files.
#[derive(Error, Debug)]
pub enum DataError {
    /// The SQLite store could not be opened or queried.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The expected table is absent from the store.
    #[error("Table \"{table}\" not found in {path}")]
    MissingTable { path: PathBuf, table: String },

    /// No column matches the time-column allow-list.
    #[error("No time column in {path}")]
    NoTimeColumn { path: PathBuf },

    /// None of the requested parameters exist in the file.
    #[error("None of the requested columns exist in {path}")]
    NoRequestedColumns { path: PathBuf },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] LogError),
}

pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_no_time_column() {
        let err = DataError::NoTimeColumn {
            path: PathBuf::from("/logs/2025-09-29.db"),
        };
        assert_eq!(err.to_string(), "No time column in /logs/2025-09-29.db");
    }

    #[test]
    fn test_error_display_missing_table() {
        let err = DataError::MissingTable {
            path: PathBuf::from("a.db"),
            table: "data".to_string(),
        };
        assert_eq!(err.to_string(), "Table \"data\" not found in a.db");
    }

    #[test]
    fn test_error_from_core() {
        let err: DataError = LogError::MissingColumn("x".to_string()).into();
        assert_eq!(err.to_string(), "Column not found: x");
    }
}
