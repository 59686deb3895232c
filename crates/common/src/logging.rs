//! Logging setup and configuration

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Setup tracing subscriber for the application
///
/// `RUST_LOG` takes precedence over `default_level` when set.
///
/// ```no_run
/// common::setup_logging("info,host=debug").unwrap();
/// ```
pub fn setup_logging(default_level: &str) -> crate::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| crate::Error::Config(format!("Invalid log filter: {}", e)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_a_config_error() {
        // RUST_LOG would shadow the default filter entirely.
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        // Fails during filter parsing, before any global subscriber is set.
        let err = setup_logging("host=debug=oops").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }
}
