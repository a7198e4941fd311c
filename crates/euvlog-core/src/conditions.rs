//! Threshold conditions over merged timelines.
//!
//! A condition such as `laser_power_value>=10` keeps the rows where the named
//! column satisfies the comparison. Several conditions are combined with a
//! single AND/OR logic.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LogError, Result};
use crate::models::SeriesTable;

// ── Comparison ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Ge,
    Le,
    Gt,
    Lt,
    Eq,
    Ne,
}

impl Comparison {
    /// Operator spellings, two-character forms first so `>=` wins over `>`.
    const TOKENS: &'static [(&'static str, Comparison)] = &[
        (">=", Comparison::Ge),
        ("<=", Comparison::Le),
        ("==", Comparison::Eq),
        ("!=", Comparison::Ne),
        (">", Comparison::Gt),
        ("<", Comparison::Lt),
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Ge => ">=",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Lt => "<",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }

    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Ge => value >= threshold,
            Comparison::Le => value <= threshold,
            Comparison::Gt => value > threshold,
            Comparison::Lt => value < threshold,
            Comparison::Eq => value == threshold,
            Comparison::Ne => value != threshold,
        }
    }
}

// ── Condition ─────────────────────────────────────────────────────────────────

/// `column <op> threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    pub op: Comparison,
    pub threshold: f64,
}

impl Condition {
    pub fn new(column: impl Into<String>, op: Comparison, threshold: f64) -> Self {
        Self {
            column: column.into(),
            op,
            threshold,
        }
    }

    /// Whether a cell satisfies the condition. A null never does.
    pub fn matches(&self, value: Option<f64>) -> bool {
        value.is_some_and(|v| self.op.holds(v, self.threshold))
    }
}

impl FromStr for Condition {
    type Err = LogError;

    /// Parse `"column<op>threshold"`, e.g. `"euvChamber_euvPower_value > 0.5"`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || LogError::InvalidCondition(s.to_string());

        let (pos, token, op) = s
            .char_indices()
            .find_map(|(i, _)| {
                Comparison::TOKENS
                    .iter()
                    .find(|(tok, _)| s[i..].starts_with(tok))
                    .map(|(tok, op)| (i, *tok, *op))
            })
            .ok_or_else(invalid)?;

        let column = s[..pos].trim();
        let threshold = s[pos + token.len()..].trim();
        if column.is_empty() {
            return Err(invalid());
        }
        let threshold: f64 = threshold.parse().map_err(|_| invalid())?;

        Ok(Condition::new(column, op, threshold))
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.op.symbol(), self.threshold)
    }
}

// ── ConditionSet ──────────────────────────────────────────────────────────────

/// How the individual condition masks are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Logic {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionSet {
    pub conditions: Vec<Condition>,
    pub logic: Logic,
}

impl ConditionSet {
    pub fn new(conditions: Vec<Condition>, logic: Logic) -> Self {
        Self { conditions, logic }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Per-row mask, or `None` when no condition could be applied.
    ///
    /// Conditions naming a column the table does not have are skipped with a
    /// warning.
    pub fn mask(&self, table: &SeriesTable) -> Option<Vec<bool>> {
        let mut combined: Option<Vec<bool>> = None;

        for condition in &self.conditions {
            let Some(column) = table.column(&condition.column) else {
                warn!("Condition column \"{}\" not in data, skipping", condition.column);
                continue;
            };
            let mask: Vec<bool> = column.values.iter().map(|v| condition.matches(*v)).collect();
            debug!(
                condition = %condition,
                matched = mask.iter().filter(|m| **m).count(),
                "condition evaluated"
            );

            combined = Some(match combined {
                None => mask,
                Some(acc) => acc
                    .into_iter()
                    .zip(mask)
                    .map(|(a, b)| match self.logic {
                        Logic::And => a && b,
                        Logic::Or => a || b,
                    })
                    .collect(),
            });
        }

        combined
    }

    /// Rows of `table` that satisfy the combined conditions. Returns a clone
    /// of `table` when nothing applied.
    pub fn apply(&self, table: &SeriesTable) -> SeriesTable {
        match self.mask(table) {
            None => table.clone(),
            Some(mask) => {
                let rows: Vec<usize> = mask
                    .iter()
                    .enumerate()
                    .filter_map(|(i, keep)| keep.then_some(i))
                    .collect();
                debug!(before = table.len(), after = rows.len(), "conditions applied");
                table.select_rows(&rows)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
