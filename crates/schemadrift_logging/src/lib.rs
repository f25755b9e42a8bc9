//! Shared logging setup for schemadrift binaries.

use anyhow::{anyhow, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "schemadrift=info,schemadrift_db=info";
const VERBOSE_LOG_FILTER: &str = "schemadrift=debug,schemadrift_db=debug";

/// Logging configuration shared by schemadrift binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    }
}

/// Initialize tracing with stderr output. `RUST_LOG` overrides the default
/// filter.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(config.verbose)));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(config.verbose)
                .with_filter(filter),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging for {}: {}", config.app_name, e))?;

    tracing::debug!(app = config.app_name, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_raises_default_level() {
        assert!(default_filter(false).contains("=info"));
        assert!(default_filter(true).contains("=debug"));
    }

    #[test]
    fn second_init_is_an_error_not_a_panic() {
        let _ = init_logging(LogConfig {
            app_name: "test",
            verbose: false,
        });
        let second = init_logging(LogConfig {
            app_name: "test",
            verbose: true,
        });
        assert!(second.is_err());
    }
}
