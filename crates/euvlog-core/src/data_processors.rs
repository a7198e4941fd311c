use chrono::{NaiveDate, NaiveDateTime};

use crate::models::{CoercionStats, RawValue};

// ── TimestampProcessor ────────────────────────────────────────────────────────

/// Recognises full date-time strings found in session-log time columns.
pub struct TimestampProcessor;

impl TimestampProcessor {
    /// Formats tried in order. Date-only strings are accepted as midnight.
    const FORMATS: &'static [&'static str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y/%m/%d %H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S",
    ];

    /// Parse a date-time string, returning `None` when the text is not a full
    /// date-time (plain numbers such as `"3600.5"` are never matched).
    pub fn parse_text(s: &str) -> Option<NaiveDateTime> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }

        for fmt in Self::FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Some(dt);
            }
        }

        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    }

    /// Upgrade a text cell to [`RawValue::Timestamp`] when it holds a
    /// date-time; any other value is returned unchanged.
    pub fn classify(value: RawValue) -> RawValue {
        if let RawValue::Text(s) = &value {
            if let Some(dt) = Self::parse_text(s) {
                return RawValue::Timestamp(dt);
            }
        }
        value
    }
}

// ── NumericCoercion ───────────────────────────────────────────────────────────

/// Outcome of coercing one raw cell to a number.
///
/// `was_coerced` is `true` whenever the cell did not arrive as a native
/// number, whether or not the conversion succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericCoercion {
    pub value: Option<f64>,
    pub was_coerced: bool,
    pub original_raw: RawValue,
}

/// Best-effort conversion of a raw cell to a finite `f64`.
///
/// * `Null`, `NaN` and infinite reals → `None`, not coerced.
/// * `Integer` / finite `Real` → the number, not coerced.
/// * `Text` → parsed after trimming; unparseable or non-finite text → `None`.
/// * `Timestamp` → `None` (a date-time is not a parameter value).
pub fn coerce_numeric(raw: &RawValue) -> NumericCoercion {
    let (value, was_coerced) = match raw {
        RawValue::Null => (None, false),
        RawValue::Integer(i) => (Some(*i as f64), false),
        RawValue::Real(f) => (f.is_finite().then_some(*f), false),
        RawValue::Text(s) => (
            s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            true,
        ),
        RawValue::Timestamp(_) => (None, true),
    };

    NumericCoercion {
        value,
        was_coerced,
        original_raw: raw.clone(),
    }
}

/// Coerce a whole column, returning the numeric values and a tally of what
/// happened. Unconvertible cells become `None`; nothing is ever an error.
pub fn coerce_column(raw: &[RawValue]) -> (Vec<Option<f64>>, CoercionStats) {
    let mut stats = CoercionStats::default();
    let values = raw
        .iter()
        .map(|cell| {
            let c = coerce_numeric(cell);
            match (&c.original_raw, c.value, c.was_coerced) {
                (RawValue::Null, _, _) => stats.null += 1,
                (_, Some(_), false) => stats.native += 1,
                (_, Some(_), true) => stats.converted += 1,
                (RawValue::Real(_), None, false) => stats.null += 1,
                (_, None, _) => stats.failed += 1,
            }
            c.value
        })
        .collect();
    (values, stats)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
