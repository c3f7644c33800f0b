//! Structured logging and tracing for Heliograph
//!
//! Console-oriented logging built on the tracing ecosystem, with
//! component-scoped loggers handed out to the individual clients.

use crate::config::LoggingConfig;
use crate::error::{HeliographError, Result};
use std::sync::Once;
use std::sync::OnceLock;
use tracing::{Level, debug, error, info, trace, warn};
use tracing_subscriber::EnvFilter;

static INIT_ONCE: Once = Once::new();
static INIT_ERROR: OnceLock<String> = OnceLock::new();

/// Initialize the logging system based on configuration
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    INIT_ONCE.call_once(|| {
        let init_result = (|| -> Result<()> {
            let level = parse_log_level(&config.level)?;
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("heliograph={},rumqttc=warn", level).into());

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();
            Ok(())
        })();

        if let Err(e) = init_result {
            let _ = INIT_ERROR.set(e.to_string());
        }
    });

    if let Some(err) = INIT_ERROR.get() {
        return Err(HeliographError::config(err.clone()));
    }
    Ok(())
}

/// Parse log level string to tracing Level
pub fn parse_log_level(level_str: &str) -> Result<Level> {
    match level_str.to_uppercase().as_str() {
        "TRACE" => Ok(Level::TRACE),
        "DEBUG" => Ok(Level::DEBUG),
        "INFO" => Ok(Level::INFO),
        "WARN" | "WARNING" => Ok(Level::WARN),
        "ERROR" | "CRITICAL" => Ok(Level::ERROR),
        _ => Err(HeliographError::config(format!(
            "Invalid log level: {}",
            level_str
        ))),
    }
}

/// Structured logger scoped to a single component
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    component: String,
}

impl StructuredLogger {
    /// Log an info message with context
    pub fn info(&self, message: &str) {
        info!(component = %self.component, "{}", message);
    }

    /// Log a warning message with context
    pub fn warn(&self, message: &str) {
        warn!(component = %self.component, "{}", message);
    }

    /// Log an error message with context
    pub fn error(&self, message: &str) {
        error!(component = %self.component, "{}", message);
    }

    /// Log a debug message with context
    pub fn debug(&self, message: &str) {
        debug!(component = %self.component, "{}", message);
    }

    /// Log a trace message with context
    pub fn trace(&self, message: &str) {
        trace!(component = %self.component, "{}", message);
    }
}

/// Create a logger for a specific component
pub fn get_logger(component: &str) -> StructuredLogger {
    StructuredLogger {
        component: component.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("DEBUG").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("info").unwrap(), Level::INFO);
        assert_eq!(parse_log_level("warning").unwrap(), Level::WARN);
        assert_eq!(parse_log_level("critical").unwrap(), Level::ERROR);
        assert!(parse_log_level("invalid").is_err());
    }

    #[test]
    fn test_structured_logger() {
        let config = LoggingConfig::default();
        init_logging(&config).ok();

        let logger = get_logger("test_component");

        // These should not panic
        logger.info("Test info message");
        logger.debug("Test debug message");
        logger.warn("Test warning message");
        logger.error("Test error message");
    }
}
