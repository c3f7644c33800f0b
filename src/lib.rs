//! # Heliograph - GoodWe inverter telemetry relay
//!
//! Polls a GoodWe (SEMS portal) monitoring backend or an MQTT broker
//! republishing inverter telemetry, optionally enriches readings with
//! ambient temperature, and relays normalized measurements to PVOutput,
//! with optional per-day CSV archival and Telegram notification on failure.
//!
//! ## Architecture
//!
//! The application follows a modular architecture with clear separation of
//! concerns:
//!
//! - `cli`: command-line surface and config-file merge
//! - `config`: configuration management and validation
//! - `logging`: structured logging and tracing
//! - `types`: canonical reading and day-trace types
//! - `source`: GoodWe portal and MQTT broker readers
//! - `filter`: duplicate suppression for the cumulative counters
//! - `backfill`: historical day-trace reconstruction
//! - `weather`: ambient temperature providers
//! - `pvoutput`: rate-limit-aware delivery protocol
//! - `csv_sink`: per-day CSV archive
//! - `notify`: Telegram failure notifications
//! - `uploader`: orchestration loop and run modes

pub mod backfill;
pub mod cli;
pub mod config;
pub mod csv_sink;
pub mod error;
pub mod filter;
pub mod logging;
pub mod notify;
pub mod pvoutput;
pub mod retry;
pub mod source;
pub mod types;
pub mod uploader;
pub mod weather;

// Re-export commonly used types
pub use config::Config;
pub use error::{HeliographError, Result};
pub use types::Reading;
pub use uploader::Uploader;
