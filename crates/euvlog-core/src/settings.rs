use std::path::PathBuf;

use chrono::NaiveDateTime;
use clap::Parser;

use crate::calculations::DEFAULT_ENERGY_PER_PULSE_J;
use crate::conditions::{Condition, ConditionSet, Logic};
use crate::data_processors::TimestampProcessor;
use crate::error::{LogError, Result};
use crate::summary::{EnergyRequest, EUV_POWER_COLUMN, LASER_POWER_COLUMN};

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Load EUV session logs, repair polling gaps and count laser shots
#[derive(Parser, Debug, Clone)]
#[command(
    name = "euvlog",
    about = "Load EUV session logs, repair polling gaps and count laser shots",
    version
)]
pub struct Settings {
    /// Folder scanned for *.db session logs
    #[arg(long, env = "EUVLOG_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Explicit session files (overrides --data-dir discovery)
    #[arg(long = "file", value_name = "PATH")]
    pub files: Vec<PathBuf>,

    /// Parameter columns to load (comma separated)
    #[arg(long = "param", value_delimiter = ',', required = true)]
    pub params: Vec<String>,

    /// Fault-indicator column names, in priority order
    #[arg(long = "fault-column", value_delimiter = ',')]
    pub fault_columns: Vec<String>,

    /// Concurrent file loads (defaults to available parallelism, 2-8)
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=64))]
    pub max_workers: Option<u16>,

    /// Loaded tables kept in memory; 0 disables the cache
    #[arg(long, env = "EUVLOG_CACHE_CAPACITY", default_value = "10")]
    pub cache_capacity: usize,

    /// Start of the analysed range, e.g. "2025-09-29 10:00:00"
    #[arg(long, value_parser = parse_datetime_arg)]
    pub start: Option<NaiveDateTime>,

    /// End of the analysed range (inclusive)
    #[arg(long, value_parser = parse_datetime_arg)]
    pub end: Option<NaiveDateTime>,

    /// Power column for shot counting
    #[arg(long, default_value = LASER_POWER_COLUMN)]
    pub power_column: String,

    /// Indicator column for shot counting
    #[arg(long, default_value = EUV_POWER_COLUMN)]
    pub indicator_column: String,

    /// Energy per laser pulse in joules
    #[arg(long, default_value_t = DEFAULT_ENERGY_PER_PULSE_J)]
    pub energy_per_pulse: f64,

    /// Skip shot counting even when both energy columns are loaded
    #[arg(long)]
    pub no_energy: bool,

    /// Row filter such as "laser_power_value>=10" (repeatable)
    #[arg(long = "where", value_name = "CONDITION")]
    pub conditions: Vec<String>,

    /// How multiple --where conditions combine
    #[arg(long, value_enum, default_value_t = Logic::And)]
    pub logic: Logic,

    /// Keep counter/monitoring logs instead of skipping them
    #[arg(long)]
    pub include_monitoring: bool,

    /// Write the merged timeline to this CSV file
    #[arg(long)]
    pub export_csv: Option<PathBuf>,

    /// Write the range summary to this JSON file
    #[arg(long)]
    pub summary_json: Option<PathBuf>,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments and apply `--debug`.
    pub fn load() -> Self {
        Self::load_from_args(std::env::args_os())
    }

    /// Same as [`Settings::load`] with an explicit argument list.
    pub fn load_from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut settings = Settings::parse_from(args);
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    /// Parse every `--where` argument.
    pub fn condition_set(&self) -> Result<ConditionSet> {
        let conditions = self
            .conditions
            .iter()
            .map(|c| c.parse::<Condition>())
            .collect::<Result<Vec<_>>>()?;
        Ok(ConditionSet::new(conditions, self.logic))
    }

    /// Shot-count request, or `None` with `--no-energy`.
    pub fn energy_request(&self) -> Result<Option<EnergyRequest>> {
        if self.no_energy {
            return Ok(None);
        }
        if self.energy_per_pulse.is_nan() || self.energy_per_pulse <= 0.0 {
            return Err(LogError::Config(format!(
                "--energy-per-pulse must be positive, got {}",
                self.energy_per_pulse
            )));
        }
        Ok(Some(EnergyRequest {
            power_column: self.power_column.clone(),
            indicator_column: self.indicator_column.clone(),
            energy_per_pulse: self.energy_per_pulse,
        }))
    }

    /// Columns to read from each file: the requested parameters plus the
    /// energy columns, deduplicated in first-seen order.
    pub fn requested_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::with_capacity(self.params.len() + 2);
        let energy = if self.no_energy {
            Vec::new()
        } else {
            vec![self.power_column.clone(), self.indicator_column.clone()]
        };
        for name in self.params.iter().chain(energy.iter()) {
            let name = name.trim();
            if !name.is_empty() && !columns.iter().any(|c| c == name) {
                columns.push(name.to_string());
            }
        }
        columns
    }
}

fn parse_datetime_arg(s: &str) -> std::result::Result<NaiveDateTime, String> {
    TimestampProcessor::parse_text(s)
        .ok_or_else(|| LogError::TimestampParse(s.to_string()).to_string())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Settings {
        let mut args = vec!["euvlog", "--param", "laser_power_value"];
        args.extend_from_slice(extra);
        Settings::load_from_args(args)
    }

    #[test]
    fn test_settings_default_values() {
        let settings = parse(&[]);
        assert_eq!(settings.params, vec!["laser_power_value"]);
        assert!(settings.files.is_empty());
        assert!(settings.fault_columns.is_empty());
        assert!(settings.max_workers.is_none());
        assert_eq!(settings.power_column, LASER_POWER_COLUMN);
        assert_eq!(settings.indicator_column, EUV_POWER_COLUMN);
        assert!((settings.energy_per_pulse - 5e-4).abs() < f64::EPSILON);
        assert_eq!(settings.logic, Logic::And);
        assert_eq!(settings.log_level, "INFO");
        assert!(!settings.include_monitoring);
        assert!(!settings.debug);
    }

    #[test]
    fn test_settings_params_comma_separated() {
        let settings = Settings::load_from_args(["euvlog", "--param", "a,b", "--param", "c"]);
        assert_eq!(settings.params, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_settings_debug_overrides_log_level() {
        let settings = parse(&["--log-level", "ERROR", "--debug"]);
        assert_eq!(settings.log_level, "DEBUG");
    }

    #[test]
    fn test_settings_range_arguments() {
        let settings = parse(&["--start", "2025-09-29 10:00:00", "--end", "2025-09-29T11:30:00"]);
        assert_eq!(settings.start.unwrap().to_string(), "2025-09-29 10:00:00");
        assert_eq!(settings.end.unwrap().to_string(), "2025-09-29 11:30:00");
    }

    #[test]
    fn test_settings_rejects_bad_datetime() {
        let result = Settings::try_parse_from(["euvlog", "--param", "p", "--start", "noon"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_condition_set_from_where_args() {
        let settings = parse(&["--where", "laser_power_value>=10", "--where", "x<1", "--logic", "or"]);
        let set = settings.condition_set().unwrap();
        assert_eq!(set.conditions.len(), 2);
        assert_eq!(set.logic, Logic::Or);

        let bad = parse(&["--where", "nonsense"]);
        assert!(bad.condition_set().is_err());
    }

    #[test]
    fn test_energy_request() {
        let request = parse(&[]).energy_request().unwrap().unwrap();
        assert_eq!(request.power_column, LASER_POWER_COLUMN);

        assert!(parse(&["--no-energy"]).energy_request().unwrap().is_none());

        let err = parse(&["--energy-per-pulse", "0"]).energy_request().unwrap_err();
        assert!(matches!(err, LogError::Config(_)));
    }

    #[test]
    fn test_requested_columns_adds_energy_columns_once() {
        let settings = parse(&["--param", "euvChamber_euvPower_value,temp"]);
        assert_eq!(
            settings.requested_columns(),
            vec![
                "laser_power_value".to_string(),
                "euvChamber_euvPower_value".to_string(),
                "temp".to_string(),
            ]
        );

        let settings = parse(&["--no-energy"]);
        assert_eq!(settings.requested_columns(), vec!["laser_power_value".to_string()]);
    }
}
