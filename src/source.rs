//! Inverter data sources
//!
//! Exactly one source is resolved from validated configuration at startup;
//! every polling cycle goes through the same `fetch_current` capability.

pub mod goodwe;
pub mod mqtt;

use crate::config::Config;
use crate::error::{HeliographError, Result};
use crate::types::Reading;
use chrono_tz::Tz;

pub use goodwe::GoodWeClient;
pub use mqtt::MqttReader;

/// The configured inverter data source
pub enum SourceReader {
    GoodWe(GoodWeClient),
    Broker(MqttReader),
}

impl SourceReader {
    /// Resolve the source once from validated configuration.
    ///
    /// Validation has already rejected contradictory settings; hitting
    /// neither branch here is a configuration error all the same.
    pub fn from_config(config: &Config, tz: Tz) -> Result<Self> {
        if config.mqtt.is_configured() {
            return Ok(Self::Broker(MqttReader::new(config.mqtt.clone(), tz)));
        }
        if config.goodwe.is_configured() {
            return Ok(Self::GoodWe(GoodWeClient::new(
                &config.goodwe.station_id,
                &config.goodwe.account,
                &config.goodwe.password,
                tz,
            )?));
        }
        Err(HeliographError::config(
            "no inverter data source configured",
        ))
    }

    /// Fetch one normalized reading from the configured source
    pub async fn fetch_current(&mut self) -> Result<Reading> {
        match self {
            Self::GoodWe(client) => client.fetch_current().await,
            Self::Broker(reader) => reader.fetch_current().await,
        }
    }

    /// Whether this source supports weather enrichment (the broker bridge
    /// republishes its own temperature)
    pub fn wants_weather(&self) -> bool {
        matches!(self, Self::GoodWe(_))
    }

    /// Access the GoodWe client for backfill operations
    pub fn as_goodwe(&mut self) -> Option<&mut GoodWeClient> {
        match self {
            Self::GoodWe(client) => Some(client),
            Self::Broker(_) => None,
        }
    }
}
