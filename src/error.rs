//! Error types and handling for Heliograph
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Heliograph operations
pub type Result<T> = std::result::Result<T, HeliographError>;

/// Main error type for Heliograph
#[derive(Debug, Error)]
pub enum HeliographError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Inverter data source errors (GoodWe portal, MQTT broker)
    #[error("Source error: {message}")]
    Source { message: String },

    /// Credential rejection by the delivery target
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Delivery target errors after exhausting retries
    #[error("Delivery error: {message}")]
    Delivery { message: String },

    /// Required data missing or outside a provider's retention window
    #[error("Incomplete data: {message}")]
    Incomplete { message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },
}

impl HeliographError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        HeliographError::Config {
            message: message.into(),
        }
    }

    /// Create a new source error
    pub fn source<S: Into<String>>(message: S) -> Self {
        HeliographError::Source {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        HeliographError::Auth {
            message: message.into(),
        }
    }

    /// Create a new delivery error
    pub fn delivery<S: Into<String>>(message: S) -> Self {
        HeliographError::Delivery {
            message: message.into(),
        }
    }

    /// Create a new incomplete-data error
    pub fn incomplete<S: Into<String>>(message: S) -> Self {
        HeliographError::Incomplete {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        HeliographError::Network {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        HeliographError::Io {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        HeliographError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether this error must abort the process instead of skipping a cycle.
    ///
    /// Configuration errors are pre-flight, and a credential rejection from
    /// the delivery target invalidates every subsequent submission; everything
    /// else is recoverable at the cycle boundary.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HeliographError::Config { .. } | HeliographError::Auth { .. }
        )
    }
}

impl From<std::io::Error> for HeliographError {
    fn from(err: std::io::Error) -> Self {
        HeliographError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for HeliographError {
    fn from(err: serde_yaml::Error) -> Self {
        HeliographError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for HeliographError {
    fn from(err: serde_json::Error) -> Self {
        HeliographError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for HeliographError {
    fn from(err: reqwest::Error) -> Self {
        HeliographError::network(err.to_string())
    }
}

impl From<csv::Error> for HeliographError {
    fn from(err: csv::Error) -> Self {
        HeliographError::io(err.to_string())
    }
}

impl From<chrono::ParseError> for HeliographError {
    fn from(err: chrono::ParseError) -> Self {
        HeliographError::validation("datetime", &err.to_string())
    }
}
