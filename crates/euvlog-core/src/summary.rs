//! Sub-range analysis over a merged timeline: per-parameter statistics, the
//! segment energy integral and fault-region extraction.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calculations::{EnergyIntegral, SegmentIntegrator, DEFAULT_ENERGY_PER_PULSE_J};
use crate::error::{LogError, Result};
use crate::models::SeriesTable;
use crate::restore::FAULT_ACTIVE;

/// Laser power channel used for shot counting.
pub const LASER_POWER_COLUMN: &str = "laser_power_value";

/// EUV chamber power channel used as the shot indicator.
pub const EUV_POWER_COLUMN: &str = "euvChamber_euvPower_value";

/// Minimum rows a range needs before it can be summarised.
const MIN_RANGE_ROWS: usize = 2;

// ── Fault regions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRegion {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Contiguous spans where `fault_column` reads [`FAULT_ACTIVE`].
///
/// A region closes at the time of the first following non-fault sample, or at
/// the last sample when the timeline ends inside a fault. Rows without a
/// datetime are ignored.
pub fn fault_regions(table: &SeriesTable, fault_column: &str) -> Vec<FaultRegion> {
    let Some(fault) = table.column(fault_column) else {
        return Vec::new();
    };

    let mut regions = Vec::new();
    let mut open: Option<NaiveDateTime> = None;
    let mut last_seen: Option<NaiveDateTime> = None;

    for (dt, value) in table.datetime.iter().zip(&fault.values) {
        let Some(dt) = *dt else { continue };
        let active = value.is_some_and(|v| v as i64 == FAULT_ACTIVE);

        match (active, open) {
            (true, None) => open = Some(dt),
            (false, Some(start)) => {
                regions.push(FaultRegion { start, end: dt });
                open = None;
            }
            _ => {}
        }
        last_seen = Some(dt);
    }

    if let (Some(start), Some(end)) = (open, last_seen) {
        regions.push(FaultRegion { start, end });
    }

    regions
}

// ── Summary records ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterStats {
    pub name: String,
    /// Non-null samples in range.
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// `mean * span_secs`, in value-seconds.
    pub integral: f64,
    /// Mean spacing between consecutive selected rows.
    pub mean_interval_secs: f64,
}

/// Which columns drive the shot count, and the energy of one pulse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyRequest {
    pub power_column: String,
    pub indicator_column: String,
    pub energy_per_pulse: f64,
}

impl Default for EnergyRequest {
    fn default() -> Self {
        Self {
            power_column: LASER_POWER_COLUMN.to_string(),
            indicator_column: EUV_POWER_COLUMN.to_string(),
            energy_per_pulse: DEFAULT_ENERGY_PER_PULSE_J,
        }
    }
}

/// One integration segment with absolute times. `index` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentReport {
    pub index: usize,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub duration_secs: f64,
    pub sample_count: usize,
    pub mean_power: f64,
    pub energy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergySummary {
    pub power_column: String,
    pub indicator_column: String,
    pub energy_per_pulse: f64,
    pub total_energy: f64,
    pub shot_count: f64,
    pub integrated_time_secs: f64,
    pub integrated_points: usize,
    pub segments: Vec<SegmentReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeSummary {
    pub first_sample: NaiveDateTime,
    pub last_sample: NaiveDateTime,
    pub span_secs: f64,
    pub sample_count: usize,
    pub parameters: Vec<ParameterStats>,
    pub energy: Option<EnergySummary>,
}

// ── summarize_range ───────────────────────────────────────────────────────────

/// Summarise rows with `start <= datetime <= end`.
///
/// `params` lists the columns to describe; unknown names and columns with
/// fewer than two non-null values in range are left out.
///
/// # Errors
/// [`LogError::InsufficientData`] when fewer than two rows fall in range,
/// [`LogError::MissingColumn`] when an energy column is absent, and any error
/// from [`SegmentIntegrator::compute_total_energy`].
pub fn summarize_range(
    table: &SeriesTable,
    start: NaiveDateTime,
    end: NaiveDateTime,
    params: &[String],
    energy: Option<&EnergyRequest>,
) -> Result<RangeSummary> {
    let (start, end) = if start <= end { (start, end) } else { (end, start) };
    let rows = table.rows_between(start, end);
    if rows.len() < MIN_RANGE_ROWS {
        return Err(LogError::InsufficientData {
            found: rows.len(),
            needed: MIN_RANGE_ROWS,
        });
    }

    let selected = table.select_rows(&rows);
    let times: Vec<NaiveDateTime> = selected.datetime.iter().flatten().copied().collect();
    let first_sample = times.iter().min().copied().unwrap_or(start);
    let last_sample = times.iter().max().copied().unwrap_or(end);
    let span_secs = seconds_between(first_sample, last_sample);
    let mean_interval_secs = span_secs / (times.len() - 1) as f64;

    let parameters: Vec<ParameterStats> = params
        .iter()
        .filter_map(|name| parameter_stats(&selected, name, span_secs, mean_interval_secs))
        .collect();

    let energy = energy
        .map(|request| energy_summary(&selected, first_sample, request))
        .transpose()?;

    debug!(
        rows = selected.len(),
        span_secs,
        parameters = parameters.len(),
        "range summarised"
    );

    Ok(RangeSummary {
        first_sample,
        last_sample,
        span_secs,
        sample_count: selected.len(),
        parameters,
        energy,
    })
}

fn parameter_stats(
    table: &SeriesTable,
    name: &str,
    span_secs: f64,
    mean_interval_secs: f64,
) -> Option<ParameterStats> {
    let values: Vec<f64> = table.column(name)?.values.iter().flatten().copied().collect();
    if values.len() < 2 {
        return None;
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Some(ParameterStats {
        name: name.to_string(),
        count: values.len(),
        mean,
        min,
        max,
        integral: mean * span_secs,
        mean_interval_secs,
    })
}

fn energy_summary(
    table: &SeriesTable,
    origin: NaiveDateTime,
    request: &EnergyRequest,
) -> Result<EnergySummary> {
    let power = table
        .column(&request.power_column)
        .ok_or_else(|| LogError::MissingColumn(request.power_column.clone()))?;
    let indicator = table
        .column(&request.indicator_column)
        .ok_or_else(|| LogError::MissingColumn(request.indicator_column.clone()))?;

    // Every selected row has a datetime, so `t` stays aligned with the columns.
    let datetimes: Vec<NaiveDateTime> = table.datetime.iter().flatten().copied().collect();
    let t: Vec<f64> = datetimes.iter().map(|dt| seconds_between(origin, *dt)).collect();

    let EnergyIntegral {
        total_energy,
        shot_count,
        segments,
    } = SegmentIntegrator::default().compute_total_energy(
        &t,
        &power.values,
        &indicator.values,
        request.energy_per_pulse,
    )?;

    let integrated_time_secs = segments.iter().map(|s| s.duration_secs).sum();
    let integrated_points = segments.iter().map(|s| s.sample_count).sum();
    let segments = segments
        .iter()
        .enumerate()
        .map(|(i, s)| SegmentReport {
            index: i + 1,
            start: datetimes[s.start],
            end: datetimes[s.end],
            duration_secs: s.duration_secs,
            sample_count: s.sample_count,
            mean_power: s.mean_power,
            energy: s.energy,
        })
        .collect();

    Ok(EnergySummary {
        power_column: request.power_column.clone(),
        indicator_column: request.indicator_column.clone(),
        energy_per_pulse: request.energy_per_pulse,
        total_energy,
        shot_count,
        integrated_time_secs,
        integrated_points,
        segments,
    })
}

fn seconds_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    let delta = to - from;
    match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 1.0e9,
        None => delta.num_milliseconds() as f64 / 1.0e3,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Column;
    use chrono::{NaiveDate, TimeDelta};

    fn base() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, 29)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn secs(s: f64) -> NaiveDateTime {
        base() + TimeDelta::milliseconds((s * 1000.0) as i64)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn timeline() -> SeriesTable {
        let t = [0.0, 1.0, 2.0, 3.0, 10.0, 11.0, 12.0];
        SeriesTable::new(
            t.iter().map(|s| Some(secs(*s))).collect(),
            vec![
                Column::new(
                    LASER_POWER_COLUMN,
                    vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0), Some(6.0), Some(7.0)],
                ),
                Column::new(
                    EUV_POWER_COLUMN,
                    vec![Some(1.0), Some(1.0), Some(1.0), Some(0.0), Some(1.0), Some(1.0), Some(1.0)],
                ),
                Column::new("sparse", vec![Some(2.0), None, None, None, None, None, None]),
            ],
        )
    }

    // ── fault regions ─────────────────────────────────────────────────────────

    #[test]
    fn test_fault_regions_close_on_next_normal_sample() {
        let table = SeriesTable::new(
            (0..6).map(|s| Some(secs(s as f64))).collect(),
            vec![Column::new(
                "fault",
                vec![Some(0.0), Some(1.0), Some(1.0), Some(0.0), Some(1.0), Some(1.0)],
            )],
        );
        let regions = fault_regions(&table, "fault");
        assert_eq!(
            regions,
            vec![
                FaultRegion { start: secs(1.0), end: secs(3.0) },
                FaultRegion { start: secs(4.0), end: secs(5.0) },
            ]
        );
    }

    #[test]
    fn test_fault_regions_missing_column() {
        assert!(fault_regions(&timeline(), "fault").is_empty());
    }

    // ── summarize_range ───────────────────────────────────────────────────────

    #[test]
    fn test_summary_parameter_stats() {
        let params = vec![LASER_POWER_COLUMN.to_string(), "sparse".to_string()];
        let summary = summarize_range(&timeline(), secs(0.0), secs(3.0), &params, None).unwrap();

        assert_eq!(summary.sample_count, 4);
        assert!(approx(summary.span_secs, 3.0));
        // "sparse" has a single non-null value in range.
        assert_eq!(summary.parameters.len(), 1);

        let power = &summary.parameters[0];
        assert_eq!(power.count, 4);
        assert!(approx(power.mean, 2.5));
        assert!(approx(power.min, 1.0));
        assert!(approx(power.max, 4.0));
        assert!(approx(power.integral, 7.5));
        assert!(approx(power.mean_interval_secs, 1.0));
        assert!(summary.energy.is_none());
    }

    #[test]
    fn test_summary_energy_segments() {
        let request = EnergyRequest {
            energy_per_pulse: 1.0,
            ..EnergyRequest::default()
        };
        let summary =
            summarize_range(&timeline(), secs(0.0), secs(12.0), &[], Some(&request)).unwrap();
        let energy = summary.energy.unwrap();

        assert!(approx(energy.total_energy, 16.0));
        assert!(approx(energy.shot_count, 16.0));
        assert_eq!(energy.segments.len(), 2);
        assert_eq!(energy.segments[0].index, 1);
        assert_eq!(energy.segments[0].start, secs(0.0));
        assert_eq!(energy.segments[0].end, secs(2.0));
        assert_eq!(energy.segments[1].start, secs(10.0));
        assert_eq!(energy.integrated_points, 6);
        assert!(approx(energy.integrated_time_secs, 4.0));
    }

    #[test]
    fn test_summary_reversed_bounds_are_swapped() {
        let summary = summarize_range(&timeline(), secs(3.0), secs(0.0), &[], None).unwrap();
        assert_eq!(summary.first_sample, secs(0.0));
        assert_eq!(summary.last_sample, secs(3.0));
    }

    #[test]
    fn test_summary_needs_two_rows() {
        let err = summarize_range(&timeline(), secs(4.0), secs(10.5), &[], None).unwrap_err();
        assert!(matches!(err, LogError::InsufficientData { found: 1, needed: 2 }));
    }

    #[test]
    fn test_summary_missing_energy_column() {
        let request = EnergyRequest {
            indicator_column: "nope".to_string(),
            ..EnergyRequest::default()
        };
        let err =
            summarize_range(&timeline(), secs(0.0), secs(12.0), &[], Some(&request)).unwrap_err();
        assert!(matches!(err, LogError::MissingColumn(c) if c == "nope"));
    }

    #[test]
    fn test_summary_serializes_to_json() {
        let summary = summarize_range(&timeline(), secs(0.0), secs(1.0), &[], None).unwrap();
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"sample_count\":2"));
    }
}
