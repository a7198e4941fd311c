//! Time-base reconstruction for session logs.
//!
//! Session logs store time as an offset from midnight (or as a date-time whose
//! date part is unreliable). The calendar date comes from the file name, e.g.
//! `LEUS_2025-09-29_A.db`.

use std::path::Path;
use std::sync::OnceLock;

use chrono::{Local, NaiveDate, NaiveDateTime, TimeDelta};
use regex::Regex;
use tracing::warn;

use crate::data_processors::coerce_numeric;
use crate::models::RawValue;

fn date_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").expect("valid date regex"))
}

// ── AnchorDate ────────────────────────────────────────────────────────────────

/// The calendar date a file's time-of-day offsets are anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorDate {
    pub date: NaiveDate,
    /// `false` when the file name held no date and "today" was used instead.
    pub from_file_name: bool,
}

impl AnchorDate {
    /// Midnight at the start of the anchor date.
    pub fn midnight(&self) -> NaiveDateTime {
        self.date.and_time(chrono::NaiveTime::MIN)
    }
}

/// Extract the first valid `YYYY-MM-DD` substring from a file name.
pub fn anchor_date_from_name(name: &str) -> Option<NaiveDate> {
    date_pattern().captures_iter(name).find_map(|caps| {
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// Resolve the anchor date for `path` from its base name.
///
/// Never fails: without a date in the name, today's date is used and a
/// warning is logged. File metadata timestamps are never consulted.
pub fn resolve_anchor_date(path: &Path) -> AnchorDate {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();

    match anchor_date_from_name(&name) {
        Some(date) => AnchorDate {
            date,
            from_file_name: true,
        },
        None => {
            let today = Local::now().date_naive();
            warn!(
                "No YYYY-MM-DD date in file name \"{}\", anchoring to today ({})",
                name, today
            );
            AnchorDate {
                date: today,
                from_file_name: false,
            }
        }
    }
}

// ── Conversion ────────────────────────────────────────────────────────────────

/// Convert one raw time value to an absolute datetime on `anchor`.
///
/// * null → `None`.
/// * a timestamp → its time-of-day on `anchor`; its own date is discarded.
/// * anything numeric (including numeric text) → that many seconds after
///   `anchor`'s midnight.
/// * anything else → `None`.
pub fn to_datetime(raw: &RawValue, anchor: NaiveDate) -> Option<NaiveDateTime> {
    match raw {
        RawValue::Null => None,
        RawValue::Timestamp(ts) => Some(anchor.and_time(ts.time())),
        other => {
            let secs = coerce_numeric(other).value?;
            offset_from_midnight(anchor, secs)
        }
    }
}

/// Vectorised form of [`to_datetime`]; the output is index-aligned with `raw`.
pub fn to_datetime_column(raw: &[RawValue], anchor: NaiveDate) -> Vec<Option<NaiveDateTime>> {
    raw.iter().map(|v| to_datetime(v, anchor)).collect()
}

fn offset_from_midnight(anchor: NaiveDate, secs: f64) -> Option<NaiveDateTime> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.trunc();
    if whole.abs() >= i64::MAX as f64 {
        return None;
    }
    let nanos = ((secs - whole) * 1.0e9).round() as i64;
    let offset =
        TimeDelta::try_seconds(whole as i64)?.checked_add(&TimeDelta::nanoseconds(nanos))?;
    anchor
        .and_time(chrono::NaiveTime::MIN)
        .checked_add_signed(offset)
}

// ── TimeBaseResolver ──────────────────────────────────────────────────────────

/// Per-file time base: the anchor date plus the conversion of a raw time
/// column into absolute datetimes.
#[derive(Debug, Clone, Copy)]
pub struct TimeBaseResolver {
    anchor: AnchorDate,
}

impl TimeBaseResolver {
    /// Build a resolver anchored on the date found in `path`'s base name.
    pub fn from_path(path: &Path) -> Self {
        Self {
            anchor: resolve_anchor_date(path),
        }
    }

    /// Build a resolver with an explicit anchor date.
    pub fn with_date(date: NaiveDate) -> Self {
        Self {
            anchor: AnchorDate {
                date,
                from_file_name: true,
            },
        }
    }

    pub fn anchor(&self) -> AnchorDate {
        self.anchor
    }

    /// Convert a raw time column into absolute datetimes.
    pub fn resolve(&self, raw: &[RawValue]) -> Vec<Option<NaiveDateTime>> {
        to_datetime_column(raw, self.anchor.date)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
