use thiserror::Error;

/// All errors produced by the log-reader core.
#[derive(Error, Debug)]
pub enum LogError {
    /// A timestamp string did not match any recognised format.
    #[error("Invalid timestamp format: {0}")]
    TimestampParse(String),

    /// A column required by an analysis is not present in the table.
    #[error("Column not found: {0}")]
    MissingColumn(String),

    /// Arrays handed to the integrator are not index-aligned.
    #[error("Length mismatch: t={t}, power={power}, indicator={indicator}")]
    LengthMismatch {
        t: usize,
        power: usize,
        indicator: usize,
    },

    /// The energy-per-pulse divisor must be strictly positive.
    #[error("Energy per pulse must be positive, got {0}")]
    NonPositiveEnergyPerPulse(f64),

    /// A condition expression such as `"col>=1.5"` could not be parsed.
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    /// A selected range holds too few samples for analysis.
    #[error("Insufficient data in selected range: {found} sample(s), need at least {needed}")]
    InsufficientData { found: usize, needed: usize },

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience alias used throughout the log-reader crates.
pub type Result<T> = std::result::Result<T, LogError>;
