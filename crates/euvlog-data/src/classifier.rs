//! Detection of counter/monitoring logs, which are recorded alongside session
//! logs but are not session data.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use rusqlite::{Connection, OpenFlags};
use tracing::debug;

/// Base-name fragments that mark a monitoring log (matched case-insensitively).
const NAME_MARKERS: &[&str] = &["cnt", "monitoring"];

fn counter_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:cnt\d*|cn[a-z]\d*|count\d*|monitor\d*|sensor\d*cnt)$")
            .expect("valid counter regex")
    })
}

/// Whether a column or parameter name looks like a counter/monitor channel.
pub fn is_counter_name(name: &str) -> bool {
    counter_pattern().is_match(name.trim())
}

pub struct FileClassifier;

impl FileClassifier {
    /// Whether `path` is a monitoring log rather than a session log.
    ///
    /// Checked in order: the base name, the requested parameter names, then
    /// every column of every table in the file. A file that cannot be opened
    /// is not a monitoring log.
    pub fn is_monitoring_file<S: AsRef<str>>(path: &Path, requested_params: &[S]) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if NAME_MARKERS.iter().any(|marker| name.contains(marker)) {
            debug!("{} classified as monitoring by name", path.display());
            return true;
        }

        if let Some(param) = requested_params.iter().find(|p| is_counter_name(p.as_ref())) {
            debug!(
                "{} classified as monitoring by requested parameter {}",
                path.display(),
                param.as_ref()
            );
            return true;
        }

        match all_column_names(path) {
            Ok(columns) => columns.iter().any(|c| is_counter_name(c)),
            Err(e) => {
                debug!("Could not inspect {}: {}", path.display(), e);
                false
            }
        }
    }
}

/// Every column name of every table in the store.
fn all_column_names(path: &Path) -> rusqlite::Result<Vec<String>> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let tables: Vec<String> = {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let mut columns = Vec::new();
    for table in &tables {
        columns.extend(crate::reader::table_columns(&conn, table)?);
    }
    Ok(columns)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn make_db(dir: &TempDir, name: &str, ddl: &str) -> PathBuf {
        let path = dir.path().join(name);
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(ddl).unwrap();
        path
    }

    const NONE: &[&str] = &[];

    #[test]
    fn test_counter_names() {
        for name in ["cnt", "CNT3", "cnx12", "count", "count2", "monitor1", "sensor4cnt"] {
            assert!(is_counter_name(name), "{name} should match");
        }
        for name in ["laser_power_value", "account", "monitoring_temp", "cn", "time"] {
            assert!(!is_counter_name(name), "{name} should not match");
        }
    }

    #[test]
    fn test_monitoring_by_file_name() {
        let dir = TempDir::new().unwrap();
        let path = make_db(&dir, "2025-09-29_CNT.db", "CREATE TABLE data (time REAL);");
        assert!(FileClassifier::is_monitoring_file(&path, NONE));

        let path = dir.path().join("Monitoring_2025-09-29.db");
        assert!(FileClassifier::is_monitoring_file(&path, NONE));
    }

    #[test]
    fn test_monitoring_by_requested_param() {
        let dir = TempDir::new().unwrap();
        let path = make_db(&dir, "2025-09-29.db", "CREATE TABLE data (time REAL, p REAL);");
        assert!(FileClassifier::is_monitoring_file(&path, &["p", "count1"]));
        assert!(!FileClassifier::is_monitoring_file(&path, &["p"]));
    }

    #[test]
    fn test_monitoring_by_column_in_any_table() {
        let dir = TempDir::new().unwrap();
        let path = make_db(
            &dir,
            "2025-09-29.db",
            "CREATE TABLE data (time REAL, p REAL); CREATE TABLE extra (cnt2 INTEGER);",
        );
        assert!(FileClassifier::is_monitoring_file(&path, &["p"]));
    }

    #[test]
    fn test_unreadable_file_is_not_monitoring() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("2025-09-29.db");
        std::fs::write(&path, vec![b'x'; 4096]).unwrap();
        assert!(!FileClassifier::is_monitoring_file(&path, NONE));

        let missing = dir.path().join("missing.db");
        assert!(!FileClassifier::is_monitoring_file(&missing, NONE));
    }
}
