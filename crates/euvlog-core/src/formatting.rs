use chrono::NaiveDateTime;

use crate::summary::{FaultRegion, RangeSummary};

/// Datetime layout used in reports and CSV exports (millisecond precision).
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Format a floating-point number with thousands separators and a fixed number
/// of decimal places.
///
/// # Examples
///
/// ```
/// use euvlog_core::formatting::format_number;
///
/// assert_eq!(format_number(1234.5,  1), "1,234.5");
/// assert_eq!(format_number(1234567.0, 0), "1,234,567");
/// assert_eq!(format_number(0.0, 2), "0.00");
/// assert_eq!(format_number(-9876.5, 1), "-9,876.5");
/// ```
pub fn format_number(value: f64, decimals: u32) -> String {
    let negative = value < 0.0;
    let abs_value = value.abs();

    // Half-ULP nudge at the target precision so exact midpoints round up.
    let factor = 10_f64.powi(decimals as i32);
    let epsilon = f64::EPSILON * abs_value * factor;
    let rounded = ((abs_value * factor) + epsilon).round() / factor;

    let integer_part = rounded.trunc() as u64;
    let frac_part = rounded - rounded.trunc();

    let grouped = group_thousands(&integer_part.to_string());

    let result = if decimals == 0 {
        grouped
    } else {
        // `frac_str` looks like "0.50"; keep the ".50".
        let frac_str = format!("{:.prec$}", frac_part, prec = decimals as usize);
        format!("{}{}", grouped, &frac_str[1..])
    };

    if negative {
        format!("-{}", result)
    } else {
        result
    }
}

/// Format a span in seconds as `"45.0s"`, `"12m 05s"` or `"3h 04m 05s"`.
///
/// # Examples
///
/// ```
/// use euvlog_core::formatting::format_duration;
///
/// assert_eq!(format_duration(45.0), "45.0s");
/// assert_eq!(format_duration(725.0), "12m 05s");
/// assert_eq!(format_duration(11045.0), "3h 04m 05s");
/// ```
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{:.1}s", seconds);
    }
    let total = seconds.round() as i64;
    let (hours, mins, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours == 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    }
}

pub fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Energies are reported in scientific notation, e.g. `"1.234e-2 J"`.
pub fn format_energy(joules: f64) -> String {
    format!("{:.3e} J", joules)
}

/// Plain-text report for a [`RangeSummary`], one block per section.
pub fn render_summary(summary: &RangeSummary) -> String {
    let mut out = format!(
        "[Selected range]\n  from:    {}\n  to:      {}\n  span:    {}\n  samples: {}\n",
        format_datetime(&summary.first_sample),
        format_datetime(&summary.last_sample),
        format_duration(summary.span_secs),
        format_number(summary.sample_count as f64, 0),
    );

    for p in &summary.parameters {
        out.push_str(&format!("\n{}:\n", p.name));
        out.push_str(&format!("  integral:      {} (unit*s)\n", format_number(p.integral, 3)));
        out.push_str(&format!("  mean:          {}\n", format_number(p.mean, 3)));
        out.push_str(&format!("  max:           {}\n", format_number(p.max, 3)));
        out.push_str(&format!("  min:           {}\n", format_number(p.min, 3)));
        out.push_str(&format!("  points:        {}\n", p.count));
        out.push_str(&format!("  mean interval: {:.3}s\n", p.mean_interval_secs));
    }

    if let Some(energy) = &summary.energy {
        out.push_str("\n[Shot count]\n");
        out.push_str(&format!(
            "  power / indicator: {} / {}\n",
            energy.power_column, energy.indicator_column
        ));
        out.push_str(&format!("  energy:         {}\n", format_energy(energy.total_energy)));
        out.push_str(&format!("  shots:          {}\n", format_number(energy.shot_count, 2)));
        out.push_str(&format!(
            "  per pulse:      {:.1} uJ\n",
            energy.energy_per_pulse * 1.0e6
        ));
        out.push_str(&format!(
            "  integrated:     {} over {} points\n",
            format_duration(energy.integrated_time_secs),
            energy.integrated_points
        ));

        for seg in &energy.segments {
            out.push_str(&format!(
                "  #{:<3} {} .. {}  {:>8.2}s  {:>6} pts  mean {:.3}  {}\n",
                seg.index,
                format_datetime(&seg.start),
                format_datetime(&seg.end),
                seg.duration_secs,
                seg.sample_count,
                seg.mean_power,
                format_energy(seg.energy),
            ));
        }
    }

    out
}

/// One line per fault region: `start .. end (duration)`.
pub fn render_fault_regions(regions: &[FaultRegion]) -> String {
    regions
        .iter()
        .map(|r| {
            let secs = (r.end - r.start).num_milliseconds() as f64 / 1.0e3;
            format!(
                "{} .. {} ({})\n",
                format_datetime(&r.start),
                format_datetime(&r.end),
                format_duration(secs)
            )
        })
        .collect()
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Insert commas every three digits from the right of an integer string.
fn group_thousands(s: &str) -> String {
    if s.len() <= 3 {
        return s.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    let remainder = chars.len() % 3;
    for (i, &c) in chars.iter().enumerate() {
        if i != 0 && (i % 3 == remainder) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

// ── Tests ──────────────────────────────────────────────────────────────────────
