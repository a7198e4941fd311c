//! Merge per-file tables into one timeline sorted by datetime.

use std::collections::BTreeMap;

use euvlog_core::models::{CoercionStats, Column, SeriesTable};
use euvlog_data::LoadOutcome;
use tracing::debug;

/// Concatenate `tables` and sort the rows by datetime.
///
/// * Columns are the union of all inputs in first-seen order; a table without
///   a column contributes nulls for it.
/// * Rows with equal datetimes keep their input order and are not
///   deduplicated. Rows without a datetime go last.
/// * The fault column is the first one any input reports.
pub fn merge_tables<'a, I>(tables: I) -> SeriesTable
where
    I: IntoIterator<Item = &'a SeriesTable>,
{
    let tables: Vec<&SeriesTable> = tables.into_iter().collect();

    let mut names: Vec<String> = Vec::new();
    for table in &tables {
        for column in &table.columns {
            if !names.contains(&column.name) {
                names.push(column.name.clone());
            }
        }
    }

    let rows: usize = tables.iter().map(|t| t.len()).sum();
    let mut datetime = Vec::with_capacity(rows);
    let mut columns: Vec<Column> = names
        .iter()
        .map(|n| Column::new(n.clone(), Vec::with_capacity(rows)))
        .collect();
    let mut coercion: BTreeMap<String, CoercionStats> = BTreeMap::new();

    for table in &tables {
        datetime.extend_from_slice(&table.datetime);
        for column in columns.iter_mut() {
            match table.column(&column.name) {
                Some(source) => column.values.extend_from_slice(&source.values),
                None => column.values.extend(std::iter::repeat(None).take(table.len())),
            }
        }
        for (name, stats) in &table.coercion {
            let total = coercion.entry(name.clone()).or_default();
            total.native += stats.native;
            total.converted += stats.converted;
            total.failed += stats.failed;
            total.null += stats.null;
        }
    }

    let concatenated = SeriesTable {
        source: None,
        datetime,
        columns,
        fault_column: tables.iter().find_map(|t| t.fault_column.clone()),
        coercion,
    };

    let mut order: Vec<usize> = (0..concatenated.len()).collect();
    // Stable: ties keep input order. `None` sorts after every datetime.
    order.sort_by_key(|&i| {
        let dt = concatenated.datetime[i];
        (dt.is_none(), dt)
    });

    debug!(
        files = tables.len(),
        rows = concatenated.len(),
        columns = concatenated.columns.len(),
        "timeline merged"
    );
    concatenated.select_rows(&order)
}

/// Merge every loaded table in `outcomes`, ignoring skipped files.
pub fn merge_outcomes(outcomes: &[LoadOutcome]) -> SeriesTable {
    merge_tables(outcomes.iter().filter_map(|o| o.table().map(|t| t.as_ref())))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::path::PathBuf;
    use std::sync::Arc;
    use euvlog_data::SkipReason;

    fn at(s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, 29)
            .unwrap()
            .and_hms_opt(10, 0, s)
            .unwrap()
    }

    fn table(times: &[Option<u32>], column: &str, values: &[f64]) -> SeriesTable {
        SeriesTable::new(
            times.iter().map(|t| t.map(at)).collect(),
            vec![Column::new(column, values.iter().copied().map(Some).collect())],
        )
    }

    #[test]
    fn test_merge_is_sorted_and_keeps_duplicates() {
        let a = table(&[Some(0), Some(2), Some(4)], "p", &[1.0, 2.0, 3.0]);
        let b = table(&[Some(1), Some(2), Some(3)], "p", &[10.0, 20.0, 30.0]);

        let merged = merge_tables([&a, &b]);
        assert_eq!(merged.len(), 6);
        assert!(merged.datetime.windows(2).all(|w| w[0] <= w[1]));
        // Equal timestamps keep input order: a's row before b's.
        assert_eq!(
            merged.column("p").unwrap().values,
            vec![Some(1.0), Some(10.0), Some(2.0), Some(20.0), Some(30.0), Some(3.0)]
        );
    }

    #[test]
    fn test_merge_unions_columns_with_nulls() {
        let a = table(&[Some(0)], "p", &[1.0]);
        let b = table(&[Some(1)], "q", &[2.0]);

        let merged = merge_tables([&a, &b]);
        assert_eq!(merged.column_names(), vec!["p", "q"]);
        assert_eq!(merged.column("p").unwrap().values, vec![Some(1.0), None]);
        assert_eq!(merged.column("q").unwrap().values, vec![None, Some(2.0)]);
    }

    #[test]
    fn test_merge_puts_undated_rows_last() {
        let a = table(&[None, Some(5), Some(1)], "p", &[0.0, 5.0, 1.0]);
        let merged = merge_tables([&a]);
        assert_eq!(merged.datetime, vec![Some(at(1)), Some(at(5)), None]);
        assert_eq!(
            merged.column("p").unwrap().values,
            vec![Some(1.0), Some(5.0), Some(0.0)]
        );
    }

    #[test]
    fn test_merge_carries_fault_column_and_coercion() {
        let mut a = table(&[Some(0)], "p", &[1.0]);
        a.coercion.insert(
            "p".to_string(),
            CoercionStats {
                native: 1,
                ..Default::default()
            },
        );
        let mut b = table(&[Some(1)], "p", &[1.0]);
        b.fault_column = Some("fault".to_string());
        b.coercion.insert(
            "p".to_string(),
            CoercionStats {
                failed: 2,
                ..Default::default()
            },
        );

        let merged = merge_tables([&a, &b]);
        assert_eq!(merged.fault_column.as_deref(), Some("fault"));
        assert_eq!(merged.coercion["p"].native, 1);
        assert_eq!(merged.coercion["p"].failed, 2);
        assert!(merged.source.is_none());
    }

    #[test]
    fn test_merge_outcomes_skips_missing() {
        let outcomes = vec![
            LoadOutcome::Loaded(Arc::new(table(&[Some(3)], "p", &[3.0]))),
            LoadOutcome::Skipped {
                path: PathBuf::from("bad.db"),
                reason: SkipReason::Unreadable,
            },
            LoadOutcome::Loaded(Arc::new(table(&[Some(1)], "p", &[1.0]))),
        ];
        let merged = merge_outcomes(&outcomes);
        assert_eq!(merged.column("p").unwrap().values, vec![Some(1.0), Some(3.0)]);
    }

    #[test]
    fn test_merge_nothing() {
        let merged = merge_tables(std::iter::empty());
        assert!(merged.is_empty());
        assert!(merged.columns.is_empty());
    }
}
