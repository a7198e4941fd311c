//! Fault-aware gap restoration.
//!
//! A link-fault indicator marks samples taken while the data source was
//! disconnected. Nulls inside normal operation are polling misses and are
//! forward-filled; values are never carried into, out of, or across a fault
//! region.

use tracing::debug;

use crate::models::SeriesTable;

/// Fault-indicator column names, in lookup priority order.
pub const FAULT_COLUMN_CANDIDATES: &[&str] = &["plc_connection_error", "serverFault", "fault"];

/// Value of the reconstructed fault state that marks a fault sample.
pub const FAULT_ACTIVE: i64 = 1;

/// Stateless gap restoration over [`SeriesTable`] columns.
pub struct GapRestorer;

impl GapRestorer {
    /// Rebuild a complete integer fault state from a sparse indicator.
    ///
    /// Nulls are forward-filled with the last observed value; leading nulls
    /// take the first observed value, or `0` when nothing was observed.
    pub fn reconstruct_fault_state(fault: &[Option<f64>]) -> Vec<i64> {
        let initial = fault.iter().flatten().next().copied().unwrap_or(0.0);
        let mut current = initial;
        fault
            .iter()
            .map(|v| {
                if let Some(x) = v {
                    current = *x;
                }
                current as i64
            })
            .collect()
    }

    /// Restore one column against a reconstructed fault state.
    ///
    /// * Fault positions are returned exactly as received.
    /// * A null outside a fault takes the nearest preceding value from the
    ///   same fault-free run, or stays null when the run has none yet.
    /// * Non-null values are unchanged.
    pub fn restore_column(values: &[Option<f64>], fault_state: &[i64]) -> Vec<Option<f64>> {
        debug_assert_eq!(values.len(), fault_state.len());

        let mut last_in_run: Option<f64> = None;
        values
            .iter()
            .zip(fault_state)
            .map(|(value, &state)| {
                if state == FAULT_ACTIVE {
                    last_in_run = None;
                    return *value;
                }
                match value {
                    Some(x) => {
                        last_in_run = Some(*x);
                        Some(*x)
                    }
                    None => last_in_run,
                }
            })
            .collect()
    }

    /// Restore `targets` in `table` using `fault_column` as the indicator.
    ///
    /// No-op when `fault_column` is `None` or absent from the table. The fault
    /// column itself is replaced by its reconstructed state. Targets that are
    /// missing, or that name the fault column, are skipped.
    pub fn restore(
        mut table: SeriesTable,
        fault_column: Option<&str>,
        targets: &[String],
    ) -> SeriesTable {
        let Some(fault_name) = fault_column else {
            return table;
        };
        let Some(fault) = table.column_mut(fault_name) else {
            return table;
        };

        let state = Self::reconstruct_fault_state(&fault.values);
        fault.values = state.iter().map(|&s| Some(s as f64)).collect();

        let fault_rows = state.iter().filter(|&&s| s == FAULT_ACTIVE).count();
        let mut filled = 0usize;

        for target in targets.iter().filter(|t| t.as_str() != fault_name) {
            if let Some(column) = table.column_mut(target) {
                let restored = Self::restore_column(&column.values, &state);
                filled += restored.iter().flatten().count() - column.non_null_count();
                column.values = restored;
            }
        }

        debug!(
            fault_column = fault_name,
            fault_rows, filled, "restored gaps against link-fault indicator"
        );

        table.fault_column = Some(fault_name.to_string());
        table
    }

    /// First of `candidates` that appears in `available`, in candidate order.
    ///
    /// Pass [`FAULT_COLUMN_CANDIDATES`] for the standard lookup.
    pub fn find_fault_column<'c, S, A>(candidates: &'c [S], available: &[A]) -> Option<&'c str>
    where
        S: AsRef<str>,
        A: AsRef<str>,
    {
        candidates
            .iter()
            .map(AsRef::as_ref)
            .find(|candidate| available.iter().any(|name| name.as_ref() == *candidate))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
