//! Flat-file export of merged timelines and range summaries.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use euvlog_core::formatting::DATETIME_FORMAT;
use euvlog_core::models::SeriesTable;
use euvlog_core::summary::RangeSummary;
use tracing::info;

use crate::error::Result;

/// Write `table` as CSV: a `datetime` column followed by every parameter
/// column. Missing values are written as empty cells.
pub fn export_csv(table: &SeriesTable, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    let header = std::iter::once("datetime").chain(table.columns.iter().map(|c| c.name.as_str()));
    wtr.write_record(header)?;

    for (row, dt) in table.datetime.iter().enumerate() {
        let mut record = Vec::with_capacity(table.columns.len() + 1);
        record.push(
            dt.map(|d| d.format(DATETIME_FORMAT).to_string())
                .unwrap_or_default(),
        );
        record.extend(
            table
                .columns
                .iter()
                .map(|c| c.values[row].map(|v| v.to_string()).unwrap_or_default()),
        );
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    info!("Exported {} rows to {}", table.len(), path.display());
    Ok(())
}

/// Write `summary` as pretty-printed JSON.
pub fn export_summary_json(summary: &RangeSummary, path: &Path) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, summary)?;
    info!("Wrote range summary to {}", path.display());
    Ok(())
}
