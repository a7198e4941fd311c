mod bootstrap;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use euvlog_core::formatting::{render_fault_regions, render_summary};
use euvlog_core::models::SeriesTable;
use euvlog_core::restore::FAULT_COLUMN_CANDIDATES;
use euvlog_core::settings::Settings;
use euvlog_core::summary::{fault_regions, summarize_range, EnergyRequest, RangeSummary};
use euvlog_core::LogError;
use euvlog_data::export::{export_csv, export_summary_json};
use euvlog_data::reader::discover_db_files;
use euvlog_data::LoaderConfig;
use euvlog_runtime::cache::{CacheConfig, TableCache};
use euvlog_runtime::loader::MultiFileLoader;
use euvlog_runtime::merge::merge_outcomes;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load();

    bootstrap::setup_logging(&settings.log_level)?;

    tracing::info!("euvlog v{} starting", env!("CARGO_PKG_VERSION"));

    let report = run(&settings).await?;
    print!("{}", report);

    Ok(())
}

/// Load, merge, filter and summarise; returns the text report.
async fn run(settings: &Settings) -> Result<String> {
    let conditions = settings.condition_set()?;
    let energy_request = settings.energy_request()?;

    let files = session_files(settings);
    if files.is_empty() {
        bail!("no session logs found in {}", settings.data_dir.display());
    }
    tracing::info!("Found {} session file(s)", files.len());

    let cache = Arc::new(TableCache::new(CacheConfig {
        capacity: settings.cache_capacity,
    }));
    let loader = MultiFileLoader::new(loader_config(settings)).with_cache(cache);

    let requested = settings.requested_columns();
    let (outcomes, load_report) = loader.load_many_with_report(&files, &requested).await;
    for outcome in &outcomes {
        if let euvlog_data::LoadOutcome::Skipped { path, reason } = outcome {
            tracing::info!("Skipped {}: {}", path.display(), reason);
        }
    }

    let merged = merge_outcomes(&outcomes);
    if merged.is_empty() {
        bail!("no session data could be loaded from {} file(s)", files.len());
    }

    let table = conditions.apply(&merged);

    let mut out = format!(
        "Loaded {} of {} file(s) ({} monitoring, {} failed), {} rows after filtering\n",
        load_report.loaded,
        load_report.total,
        load_report.monitoring,
        load_report.failed,
        table.len()
    );

    if let Some(fault_column) = table.fault_column.as_deref() {
        let regions = fault_regions(&table, fault_column);
        out.push_str(&format!("\n[Fault regions: {}] {}\n", fault_column, regions.len()));
        out.push_str(&render_fault_regions(&regions));
    }

    let summary = range_summary(settings, &table, energy_request.as_ref())?;
    if let Some(summary) = &summary {
        out.push('\n');
        out.push_str(&render_summary(summary));
    }

    if let Some(path) = &settings.export_csv {
        export_csv(&table, path).with_context(|| format!("exporting {}", path.display()))?;
    }
    if let Some(path) = &settings.summary_json {
        match &summary {
            Some(summary) => export_summary_json(summary, path)
                .with_context(|| format!("writing {}", path.display()))?,
            None => tracing::warn!("No range summary to write to {}", path.display()),
        }
    }

    Ok(out)
}

fn session_files(settings: &Settings) -> Vec<PathBuf> {
    if settings.files.is_empty() {
        discover_db_files(&settings.data_dir)
    } else {
        settings.files.clone()
    }
}

fn loader_config(settings: &Settings) -> LoaderConfig {
    let fault_candidates = if settings.fault_columns.is_empty() {
        FAULT_COLUMN_CANDIDATES.iter().map(|s| s.to_string()).collect()
    } else {
        settings.fault_columns.clone()
    };

    LoaderConfig {
        fault_candidates,
        exclude_monitoring: !settings.include_monitoring,
        max_workers: settings.max_workers.map(usize::from),
        ..LoaderConfig::default()
    }
}

/// Summary over `--start`/`--end`, defaulting to the data's own bounds.
/// Too few rows in range is reported and yields `None`.
fn range_summary(
    settings: &Settings,
    table: &SeriesTable,
    energy_request: Option<&EnergyRequest>,
) -> Result<Option<RangeSummary>> {
    let Some((first, last)) = table.time_bounds() else {
        tracing::warn!("No timestamped rows, skipping range summary");
        return Ok(None);
    };
    let start = settings.start.unwrap_or(first);
    let end = settings.end.unwrap_or(last);

    let energy = energy_request.filter(|request| {
        let present = table.has_column(&request.power_column)
            && table.has_column(&request.indicator_column);
        if !present {
            tracing::warn!(
                "Shot count needs both {} and {}, skipping it",
                request.power_column,
                request.indicator_column
            );
        }
        present
    });

    match summarize_range(table, start, end, &settings.params, energy) {
        Ok(summary) => Ok(Some(summary)),
        Err(LogError::InsufficientData { found, needed }) => {
            tracing::warn!(
                "Only {} row(s) between {} and {}, need at least {}",
                found,
                start,
                end,
                needed
            );
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
