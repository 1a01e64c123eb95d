//! Structured logging with tracing
//!
//! Provides configurable logging with JSON output and slow query logging

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub level: String,

    /// Enable JSON format output
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Parse log level from string
    pub fn parse_level(&self) -> Level {
        match self.level.to_uppercase().as_str() {
            "ERROR" => Level::ERROR,
            "WARN" => Level::WARN,
            "INFO" => Level::INFO,
            "DEBUG" => Level::DEBUG,
            "TRACE" => Level::TRACE,
            _ => Level::INFO,
        }
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` wins over the configured level. Fails if a global subscriber
/// is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.parse_level().to_string()));

    let subscriber = Registry::default().with(env_filter);

    if config.json_format {
        let json_layer = fmt::layer().json().with_current_span(true).with_target(true);
        subscriber.with(json_layer).try_init().context("Failed to install JSON subscriber")?;
    } else {
        let fmt_layer = fmt::layer().with_target(true).compact();
        subscriber.with(fmt_layer).try_init().context("Failed to install subscriber")?;
    }

    tracing::info!("Logging initialized: level={}, json={}", config.level, config.json_format);

    Ok(())
}

/// Times one query and reports it on completion
#[derive(Debug)]
pub struct QueryTimer {
    start: Instant,
    collection: String,
    threshold: Option<Duration>,
}

impl QueryTimer {
    pub fn start(collection: &str, threshold_ms: Option<u64>) -> Self {
        Self {
            start: Instant::now(),
            collection: collection.to_string(),
            threshold: threshold_ms.map(Duration::from_millis),
        }
    }

    /// Log the finished query; slow ones go to the `slow_query` target as a warning
    pub fn finish(&self, steps: &str, results: usize) -> Duration {
        let duration = self.start.elapsed();

        match self.threshold {
            Some(threshold) if duration >= threshold => {
                tracing::warn!(
                    target: "slow_query",
                    duration_ms = duration.as_millis() as u64,
                    collection = %self.collection,
                    steps,
                    results,
                    "Slow query detected"
                );
            }
            _ => {
                tracing::debug!(
                    duration_us = duration.as_micros() as u64,
                    collection = %self.collection,
                    steps,
                    results,
                    "query finished"
                );
            }
        }

        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.parse_level(), Level::INFO);

        let config = LoggingConfig {
            level: "trace".to_string(),
            json_format: true,
        };
        assert_eq!(config.parse_level(), Level::TRACE);

        let config = LoggingConfig {
            level: "loud".to_string(),
            json_format: false,
        };
        assert_eq!(config.parse_level(), Level::INFO);
    }

    #[test]
    fn test_init_logging_twice_fails() {
        let config = LoggingConfig::default();
        let first = init_logging(&config);
        // Another test may have installed a subscriber already; the second call always fails
        let second = init_logging(&config);
        assert!(first.is_ok() || second.is_err());
        assert!(second.is_err());
    }

    #[test]
    fn test_query_timer() {
        let timer = QueryTimer::start("users", Some(0));
        let elapsed = timer.finish("scan", 3);
        assert!(elapsed >= Duration::ZERO);

        let timer = QueryTimer::start("users", None);
        timer.finish("get", 0);
    }
}
