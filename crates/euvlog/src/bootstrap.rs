use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// `tracing` directive for one of the accepted `--log-level` names.
/// Unknown names are passed through unchanged.
pub fn level_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" | "CRITICAL" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" => "warn".to_string(),
        "ERROR" => "error".to_string(),
        _ => log_level.to_string(),
    }
}

/// Initialise the global `tracing` subscriber on stderr.
///
/// `RUST_LOG` wins over `log_level` when set. An unparsable directive falls
/// back to `"info"`.
pub fn setup_logging(log_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level_directive(log_level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(subscriber)
        .try_init()?;

    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_directive_mapping() {
        assert_eq!(level_directive("DEBUG"), "debug");
        assert_eq!(level_directive("critical"), "debug");
        assert_eq!(level_directive("INFO"), "info");
        assert_eq!(level_directive("Warning"), "warn");
        assert_eq!(level_directive("ERROR"), "error");
        assert_eq!(level_directive("euvlog_data=trace"), "euvlog_data=trace");
    }

    #[test]
    fn test_setup_logging_only_once() {
        // The first call may race other tests; a second call must fail cleanly.
        let _ = setup_logging("INFO");
        assert!(setup_logging("INFO").is_err());
    }
}
