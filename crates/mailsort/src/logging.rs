//! Process-wide log setup.
//!
//! Library code logs through the `log` macros and `tracing` spans. Both end
//! up in one `tracing_subscriber` registry: `log` records are forwarded by
//! [`tracing_log::LogTracer`].

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::MailsortError;

/// Builds the filter. `RUST_LOG` wins over the configured level.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Installs the global subscriber. Call once, before any pipeline runs.
///
/// The `log` bridge is installed here and nowhere else; a second call fails
/// with [`MailsortError::Logging`].
pub fn init(config: &LoggingConfig) -> Result<(), MailsortError> {
    tracing_log::LogTracer::init()
        .map_err(|e| MailsortError::Logging(format!("failed to bridge log records: {}", e)))?;

    let console = match config.format {
        LogFormat::Console => fmt::layer().with_writer(std::io::stderr).boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let file_layer = match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    MailsortError::Logging(format!(
                        "failed to create log directory '{}': {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    MailsortError::Logging(format!(
                        "failed to open log file '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(build_filter(config))
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| MailsortError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_filter_uses_configured_level() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "debug".to_string(),
            ..Default::default()
        };
        assert_eq!(build_filter(&config).to_string(), "debug");
    }

    #[test]
    #[serial]
    fn test_rust_log_overrides_config() {
        std::env::set_var("RUST_LOG", "warn");
        let filter = build_filter(&LoggingConfig::default());
        std::env::remove_var("RUST_LOG");
        assert_eq!(filter.to_string(), "warn");
    }

    // The only test in this binary that installs the global subscriber.
    #[test]
    #[serial]
    fn test_init_succeeds_once() {
        std::env::remove_var("RUST_LOG");
        assert!(init(&LoggingConfig::default()).is_ok());
        log::info!("bridged through the subscriber");

        let again = init(&LoggingConfig::default());
        assert!(matches!(again, Err(MailsortError::Logging(_))));
    }
}
