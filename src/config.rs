//! Configuration management for Heliograph
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files, with command-line overrides applied on top.

use crate::error::{HeliographError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Run mode selected on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Continuous live polling and upload
    Live,
    /// One-shot historical copy for a past date
    BackfillDate(NaiveDate),
    /// One-shot bulk upload from a CSV archive
    BackfillCsv(PathBuf),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// GoodWe (SEMS portal) polling source
    pub goodwe: GoodWeConfig,

    /// MQTT broker snapshot source
    pub mqtt: MqttConfig,

    /// PVOutput delivery target
    pub pvoutput: PvOutputConfig,

    /// Weather providers for temperature enrichment
    pub weather: WeatherConfig,

    /// Telegram failure notifications
    pub telegram: TelegramConfig,

    /// Submission interval in minutes (5, 10 or 15); absent means run once
    pub interval_minutes: Option<u32>,

    /// Submit PV voltage instead of grid voltage
    pub pv_voltage: bool,

    /// Skip upload cycles while the inverter is offline
    pub skip_offline: bool,

    /// CSV archive filename template; a literal `DATE` is replaced by the
    /// current date
    pub csv: Option<String>,

    /// Write and read CSV numbers with a decimal comma
    pub decimal_comma: bool,

    /// IANA timezone name used for all local timestamps
    pub timezone: String,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// GoodWe SEMS portal credentials
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GoodWeConfig {
    /// Power station ID
    pub station_id: String,

    /// Portal account (e-mail address)
    pub account: String,

    /// Portal password
    pub password: String,
}

impl GoodWeConfig {
    pub fn is_configured(&self) -> bool {
        !self.station_id.is_empty()
    }
}

/// MQTT broker connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker hostname
    pub host: String,

    /// Broker TCP port
    pub port: u16,

    /// Optional username
    pub username: String,

    /// Optional password
    pub password: String,

    /// Root topic the inverter bridge publishes under
    pub topic: String,
}

impl MqttConfig {
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty()
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            topic: String::new(),
        }
    }
}

/// PVOutput credentials
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PvOutputConfig {
    /// Registered system ID
    pub system_id: String,

    /// API key
    pub api_key: String,
}

impl PvOutputConfig {
    pub fn is_configured(&self) -> bool {
        !self.system_id.is_empty() && !self.api_key.is_empty()
    }
}

/// Weather provider API keys; the configured key selects the provider
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WeatherConfig {
    /// Dark Sky API key
    pub darksky_api_key: String,

    /// OpenWeather API key
    pub openweather_api_key: String,
}

/// Telegram bot notification settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token
    pub token: String,

    /// Chat ID to send failure messages to
    pub chat_id: String,
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        !self.token.is_empty() && !self.chat_id.is_empty()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (DEBUG, INFO, WARNING, ERROR, CRITICAL)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the configured timezone
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        chrono_tz::Tz::from_str(&self.timezone).map_err(|_| {
            HeliographError::validation("timezone", &format!("unknown timezone {}", self.timezone))
        })
    }

    /// Validate the configuration for the selected run mode.
    ///
    /// All failures here are pre-flight and fatal; no network activity has
    /// happened yet.
    pub fn validate(&self, mode: &Mode) -> Result<()> {
        if self.goodwe.is_configured() && self.mqtt.is_configured() {
            return Err(HeliographError::config(
                "Choose either GoodWe or MQTT as source for inverter data. \
                 Both cannot be used simultaneously.",
            ));
        }

        if self.goodwe.is_configured()
            && (self.goodwe.account.is_empty() || self.goodwe.password.is_empty())
        {
            return Err(HeliographError::validation(
                "goodwe",
                "station_id requires account and password",
            ));
        }

        if self.mqtt.is_configured() && self.mqtt.topic.is_empty() {
            return Err(HeliographError::validation(
                "mqtt.topic",
                "MQTT source requires a topic",
            ));
        }

        match mode {
            Mode::Live => {
                if !self.goodwe.is_configured() && !self.mqtt.is_configured() {
                    return Err(HeliographError::config(
                        "Missing source configuration. Provide either GoodWe (SEMS portal) \
                         credentials or an MQTT host and topic.",
                    ));
                }
                if let Some(minutes) = self.interval_minutes
                    && !matches!(minutes, 5 | 10 | 15)
                {
                    return Err(HeliographError::validation(
                        "interval_minutes",
                        "must be 5, 10 or 15",
                    ));
                }
            }
            Mode::BackfillDate(_) => {
                if self.mqtt.is_configured() {
                    return Err(HeliographError::config(
                        "MQTT cannot be used for backfilling historic data. Remove the MQTT \
                         options and provide GoodWe (SEMS portal) credentials.",
                    ));
                }
                if !self.goodwe.is_configured() {
                    return Err(HeliographError::config(
                        "Backfilling historic data requires GoodWe (SEMS portal) credentials.",
                    ));
                }
            }
            Mode::BackfillCsv(_) => {
                if !self.pvoutput.is_configured() {
                    return Err(HeliographError::config(
                        "CSV upload requires PVOutput system id and API key.",
                    ));
                }
            }
        }

        self.tz()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            goodwe: GoodWeConfig::default(),
            mqtt: MqttConfig::default(),
            pvoutput: PvOutputConfig::default(),
            weather: WeatherConfig::default(),
            telegram: TelegramConfig::default(),
            interval_minutes: None,
            pv_voltage: false,
            skip_offline: false,
            csv: None,
            decimal_comma: false,
            timezone: "UTC".to_string(),
            logging: LoggingConfig::default(),
        }
    }
}
